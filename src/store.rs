use crate::error::StoreError;
use crate::message::{ClassifiedRow, Ledger};
use std::fs::{self, File};
use std::io;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the canonical copy of the ledger lives.
pub trait LedgerStore {
    /// Returns an empty ledger when nothing has been stored yet.
    fn load(&self) -> Result<Ledger, StoreError>;
    /// Replaces the stored ledger. On error the previous copy is kept.
    fn save(&self, ledger: &Ledger) -> Result<(), StoreError>;
    /// Whether a ledger has been stored before.
    fn exists(&self) -> bool;
}

/// A ledger kept as a CSV file with a header row.
pub struct CsvLedgerStore {
    path: PathBuf,
}

impl CsvLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvLedgerStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    fn write_to(&self, path: &Path, ledger: &Ledger) -> io::Result<()> {
        let file = File::create(path)?;
        #[cfg(unix)]
        set_ledger_permission(&file)?;

        let mut writer = csv::Writer::from_writer(file);
        if ledger.is_empty() {
            // Serializing no rows would leave the file without a header.
            writer.write_record(HEADER)?;
        }
        for row in ledger {
            writer.serialize(row)?;
        }
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }

    fn replace_with(&self, tmp_path: &Path) -> io::Result<()> {
        if self.path.exists() {
            fs::copy(&self.path, self.sibling(".bak"))?;
        }
        fs::rename(tmp_path, &self.path)
    }
}

const HEADER: [&str; 6] = ["Date", "Category", "Sender", "Subject", "Snippet", "Message ID"];

#[cfg(unix)]
fn set_ledger_permission(file: &File) -> io::Result<()> {
    let mut perms = file.metadata()?.permissions();
    let mode = (perms.mode() & !0o777) | 0o600;
    perms.set_mode(mode);
    file.set_permissions(perms)
}

impl LedgerStore for CsvLedgerStore {
    fn load(&self) -> Result<Ledger, StoreError> {
        let read_error = |source| StoreError::Read {
            path: self.path.clone(),
            source,
        };
        let mut reader = match csv::Reader::from_path(&self.path) {
            Ok(reader) => reader,
            Err(e) => {
                if let csv::ErrorKind::Io(io) = e.kind() {
                    if io.kind() == io::ErrorKind::NotFound {
                        debug!("no ledger at {:?}, starting empty", self.path);
                        return Ok(vec![]);
                    }
                }
                return Err(read_error(e));
            }
        };
        reader
            .deserialize::<ClassifiedRow>()
            .collect::<Result<Ledger, _>>()
            .map_err(read_error)
    }

    fn save(&self, ledger: &Ledger) -> Result<(), StoreError> {
        let write_error = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        // The ledger itself is only ever replaced by a rename.
        let tmp_path = self.sibling(".tmp");
        let result = self
            .write_to(&tmp_path, ledger)
            .and_then(|_| self.replace_with(&tmp_path));
        if let Err(e) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(write_error(e));
        }
        debug!("wrote {} rows to {:?}", ledger.len(), self.path);
        Ok(())
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }
}
