use crate::error::FetchError;
use crate::message::RawMessage;
use crate::utils;
use chrono::{DateTime, FixedOffset, Utc};
use mailparse::{MailHeader, MailHeaderMap, ParsedMail};
use rayon::prelude::*;
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Longest snippet kept from a message body, in characters.
pub const SNIPPET_LEN: usize = 200;

/// Supplies the messages received since a point in time. No ordering is
/// promised.
pub trait MessageSource {
    fn fetch(&self, since: DateTime<FixedOffset>) -> Result<Vec<RawMessage>, FetchError>;
}

/// Reads messages from the `new` and `cur` directories of a maildir.
pub struct MaildirSource {
    root: PathBuf,
    quiet: bool,
}

impl MaildirSource {
    pub fn new(root: impl Into<PathBuf>, quiet: bool) -> Self {
        MaildirSource {
            root: root.into(),
            quiet,
        }
    }

    fn list_files(&self) -> Result<Vec<PathBuf>, FetchError> {
        let mut files = vec![];
        for sub in ["new", "cur"] {
            let dir = self.root.join(sub);
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                // Some tools never create cur until a mail has been seen.
                Err(e) if sub == "cur" && e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => return Err(FetchError::Maildir { path: dir, source }),
            };
            for entry in entries {
                let entry = entry.map_err(|source| FetchError::Maildir {
                    path: dir.clone(),
                    source,
                })?;
                let path = entry.path();
                if path.is_file() && !is_hidden(&path) {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }
}

impl MessageSource for MaildirSource {
    fn fetch(&self, since: DateTime<FixedOffset>) -> Result<Vec<RawMessage>, FetchError> {
        let files = self.list_files()?;
        if files.is_empty() {
            return Ok(vec![]);
        }

        let progress = utils::create_progress_bar(self.quiet, files.len());
        progress.set_message("Reading");
        let messages: Vec<_> = files
            .into_par_iter()
            .filter_map(|path| {
                let result = read_message(&path);
                progress.inc(1);
                match result {
                    Ok(message) => Some(message),
                    Err(e) => {
                        warn!("skipping unreadable message {:?}: {}", path, e);
                        None
                    }
                }
            })
            .filter(|message| message.timestamp >= since)
            .collect();
        progress.finish_and_clear();

        debug!("{} messages in window from {:?}", messages.len(), self.root);
        Ok(messages)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.starts_with('.'))
}

fn read_message(path: &Path) -> io::Result<RawMessage> {
    let raw = fs::read(path)?;
    let mail = mailparse::parse_mail(&raw)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let headers = &mail.headers;

    let timestamp = match headers.get_first_value("Date").as_deref().and_then(parse_date) {
        Some(dt) => dt,
        None => {
            let modified = fs::metadata(path)?.modified()?;
            DateTime::<Utc>::from(modified).into()
        }
    };
    let id = match headers.get_first_value("Message-ID") {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => maildir_name(path),
    };

    Ok(RawMessage {
        id,
        timestamp,
        sender: header_text(headers, "From"),
        subject: header_text(headers, "Subject"),
        snippet: make_snippet(&text_body(&mail).unwrap_or_default()),
    })
}

/// The unique part of a maildir file name, without the `:2,` info suffix
/// that changes when a message moves from `new` to `cur`.
fn maildir_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.find(':') {
        Some(pos) => name[..pos].to_string(),
        None => name,
    }
}

/// A decoded header value with folding whitespace collapsed, or an empty
/// string when the header is missing.
fn header_text(headers: &[MailHeader], name: &str) -> String {
    headers
        .get_first_value(name)
        .map(|value| value.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

fn normalize_datetime(mut dt: &str) -> Cow<str> {
    // Trailing commentary timezone info is not recognized.
    if dt.ends_with(')') {
        if let Some(pos) = dt.rfind('(') {
            dt = &dt[..pos];
        }
    }
    dt = dt.trim();
    // -0000 timezone cannot be parsed. Let's just treat it as +0000.
    if let Some(stripped) = dt.strip_suffix("-0000") {
        Cow::Owned(format!("{}+0000", stripped))
    } else {
        Cow::Borrowed(dt)
    }
}

/// Parses the value of a `Date` header.
pub(crate) fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(&normalize_datetime(value)).ok()
}

/// Finds the first plain text part of a mail, descending into multipart
/// containers, with its transfer encoding and charset decoded.
fn text_body(mail: &ParsedMail) -> Option<String> {
    let mime = mail.ctype.mimetype.to_ascii_lowercase();
    if mime.starts_with("multipart/") {
        return mail.subparts.iter().find_map(text_body);
    }
    if mime != "text/plain" {
        return None;
    }
    match mail.get_body() {
        Ok(body) => Some(body),
        Err(e) => {
            debug!("undecodable text part: {}", e);
            None
        }
    }
}

fn make_snippet(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SNIPPET_LEN).collect()
}
