use assert_cmd::Command;
use chrono::{Duration, Utc};
use jobmail_ledger::message::{Label, Ledger};
use jobmail_ledger::store::{CsvLedgerStore, LedgerStore};
use once_cell::sync::Lazy;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::thread;
use tempfile::TempDir;
use tiny_http::{Header, Response, Server};

/// Base URL of a local stand-in for the chat completions API. It labels a
/// mail by looking for keywords in the prompt.
static MODEL_SERVER: Lazy<String> = Lazy::new(|| {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut body = String::new();
            let _ = request.as_reader().read_to_string(&mut body);
            let reply = completion(&body);
            let header = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
            let _ = request.respond(Response::from_string(reply).with_header(header));
        }
    });
    format!("http://{}/v1", addr)
});

fn completion(body: &str) -> String {
    let request: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
    let prompt = request["messages"][1]["content"].as_str().unwrap_or("");
    let label = if prompt.contains("Interview") {
        "Interview Received"
    } else if prompt.contains("applying") {
        "Application Submitted"
    } else {
        "Irrelevant"
    };
    serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": label}}]
    })
    .to_string()
}

struct Mailbox {
    dir: TempDir,
}

impl Mailbox {
    fn new() -> Self {
        Mailbox {
            dir: TempDir::new().unwrap(),
        }
    }

    fn maildir(&self) -> PathBuf {
        self.dir.path().join("Mail")
    }

    fn ledger(&self) -> PathBuf {
        self.dir.path().join("ledger.csv")
    }

    fn deliver(&self, name: &str, from: Option<&str>, subject: &str, body: &str) {
        let new_dir = self.maildir().join("new");
        fs::create_dir_all(&new_dir).unwrap();
        let date = (Utc::now() - Duration::hours(1)).to_rfc2822();
        let mut mail = String::new();
        if let Some(from) = from {
            mail.push_str(&format!("From: {}\r\n", from));
        }
        mail.push_str(&format!(
            "Subject: {}\r\nDate: {}\r\nMessage-ID: <{}@example.com>\r\n\r\n{}\r\n",
            subject, date, name, body
        ));
        fs::write(new_dir.join(name), mail).unwrap();
    }

    fn deliver_defaults(&self) {
        self.deliver("1", Some("Acme HR <hr@acme.com>"), "Thanks for applying", "We got it.");
        self.deliver("2", Some("talent@initech.com"), "Interview invitation", "Are you free?");
        self.deliver("3", None, "No sender", "Who sent this?");
        self.deliver("4", Some("GitHub <noreply@github.com>"), "Thanks for applying", "CI passed.");
    }

    fn run(&self, api_base: &str, extra: &[&str]) -> assert_cmd::assert::Assert {
        Command::cargo_bin(env!("CARGO_PKG_NAME"))
            .unwrap()
            .env_remove("RUST_LOG")
            .arg("--quiet")
            .arg("--api-key=test")
            .arg(format!("--api-base={}", api_base))
            .arg("--timeout-secs=5")
            .arg("--ledger")
            .arg(self.ledger())
            .args(extra)
            .arg(self.maildir())
            .assert()
    }

    fn rows(&self) -> Ledger {
        CsvLedgerStore::new(self.ledger()).load().unwrap()
    }
}

fn labels(ledger: &Ledger) -> Vec<(String, Label)> {
    ledger
        .iter()
        .map(|row| (row.sender.clone(), row.label))
        .collect()
}

fn stdout_of(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).into_owned()
}

#[test]
fn basic_tracking() {
    let mailbox = Mailbox::new();
    mailbox.deliver_defaults();

    let assert = mailbox.run(&MODEL_SERVER, &[]).success();
    let stdout = stdout_of(&assert);
    assert!(stdout.contains("processed 4"), "{}", stdout);
    assert!(stdout.contains("skipped 1"), "{}", stdout);
    assert!(stdout.contains("appended 3"), "{}", stdout);

    let rows = mailbox.rows();
    assert_eq!(
        labels(&rows),
        [
            ("Acme HR <hr@acme.com>".to_string(), Label::ApplicationSubmitted),
            ("talent@initech.com".to_string(), Label::InterviewReceived),
            ("GitHub <noreply@github.com>".to_string(), Label::Irrelevant),
        ]
    );
    assert_eq!(rows[0].source_id.as_deref(), Some("<1@example.com>"));
    assert_eq!(rows[0].snippet, "We got it.");
}

#[test]
fn rerun_adds_nothing() {
    let mailbox = Mailbox::new();
    mailbox.deliver_defaults();
    mailbox.run(&MODEL_SERVER, &[]).success();
    let first = mailbox.rows();

    let assert = mailbox.run(&MODEL_SERVER, &[]).success();
    assert!(stdout_of(&assert).contains("appended 0"));
    assert_eq!(mailbox.rows(), first);

    // A new mail arriving later is appended after the existing rows.
    mailbox.deliver("5", Some("jobs@globex.com"), "Interview scheduled", "See you.");
    mailbox.run(&MODEL_SERVER, &[]).success();
    let rows = mailbox.rows();
    assert_eq!(rows.len(), first.len() + 1);
    assert_eq!(&rows[..first.len()], &first[..]);
    assert_eq!(rows[first.len()].label, Label::InterviewReceived);
}

#[test]
fn drop_irrelevant() {
    let mailbox = Mailbox::new();
    mailbox.deliver_defaults();
    let assert = mailbox.run(&MODEL_SERVER, &["--drop-irrelevant"]).success();
    assert!(stdout_of(&assert).contains("filtered 1 irrelevant"));
    assert_eq!(mailbox.rows().len(), 2);
}

#[test]
fn unreachable_model_falls_back() {
    let mailbox = Mailbox::new();
    mailbox.deliver_defaults();
    let assert = mailbox.run("http://127.0.0.1:9/v1", &[]).success();
    let stdout = stdout_of(&assert);
    assert!(stdout.contains("(3 fallback)"), "{}", stdout);
    assert!(mailbox.rows().iter().all(|row| row.label == Label::Irrelevant));
    assert_eq!(mailbox.rows().len(), 3);
}

#[test]
fn missing_maildir_fails_without_writing() {
    let mailbox = Mailbox::new();
    mailbox.run(&MODEL_SERVER, &[]).failure();
    assert!(!mailbox.ledger().exists());
}

#[test]
fn corrupt_ledger_is_left_alone() {
    let mailbox = Mailbox::new();
    mailbox.deliver_defaults();
    let garbage = "Date,Category\nyesterday,Maybe\n";
    fs::write(mailbox.ledger(), garbage).unwrap();
    mailbox.run(&MODEL_SERVER, &[]).failure();
    assert_eq!(fs::read_to_string(mailbox.ledger()).unwrap(), garbage);
}

#[test]
fn encoded_subject_reaches_model_decoded() {
    let mailbox = Mailbox::new();
    mailbox.deliver(
        "1",
        Some("talent@initech.com"),
        "=?UTF-8?B?SW50ZXJ2aWV3IGludml0YXRpb24=?=",
        "Are you free?",
    );
    mailbox.run(&MODEL_SERVER, &[]).success();
    let rows = mailbox.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].subject, "Interview invitation");
    assert_eq!(rows[0].label, Label::InterviewReceived);
}
