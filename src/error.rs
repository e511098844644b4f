use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single call to the classification backend. Never fatal.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response contained no choices")]
    EmptyResponse,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("cannot read maildir {path:?}: {source}")]
    Maildir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cannot read ledger {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("cannot write ledger {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A fatal run error, naming the collaborator that failed. When one of these
/// is returned the persisted ledger has not been touched.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("fetching messages failed")]
    Fetch(#[source] FetchError),

    #[error("loading the ledger failed")]
    StoreRead(#[source] StoreError),

    #[error("saving the ledger failed")]
    StoreWrite(#[source] StoreError),
}
