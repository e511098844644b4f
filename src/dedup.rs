use crate::message::{ClassifiedRow, Ledger};
use chrono::NaiveDate;
use clap::ValueEnum;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// How the identity of a row is derived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DedupStrategy {
    /// Sender, subject and the calendar day of the timestamp.
    #[default]
    Composite,
    /// The source message id, or the composite key for rows without one.
    SourceId,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Composite {
        sender: String,
        subject: String,
        day: NaiveDate,
    },
    SourceId(String),
}

impl DedupKey {
    /// The label never takes part in the key: a relabelled message is still
    /// the same message.
    pub fn of(row: &ClassifiedRow, strategy: DedupStrategy) -> Self {
        if strategy == DedupStrategy::SourceId {
            if let Some(id) = row.source_id.as_ref().filter(|id| !id.is_empty()) {
                return DedupKey::SourceId(id.clone());
            }
        }
        DedupKey::Composite {
            sender: row.sender.clone(),
            subject: row.subject.clone(),
            day: row.timestamp.naive_utc().date(),
        }
    }
}

pub type Fingerprint = [u8; 32];

/// Digest of the content a key does not cover.
pub fn fingerprint(row: &ClassifiedRow) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(row.snippet.as_bytes());
    let mut result = [0; 32];
    result.copy_from_slice(hasher.finalize().as_slice());
    result
}

/// The keys of a ledger, computed once so each candidate costs one lookup.
#[derive(Debug)]
pub struct KeyIndex {
    strategy: DedupStrategy,
    keys: HashMap<DedupKey, Fingerprint>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    New,
    Duplicate,
    /// Same key as an indexed row, but the snippet differs.
    Conflicting,
}

impl KeyIndex {
    pub fn new(existing: &[ClassifiedRow], strategy: DedupStrategy) -> Self {
        let mut index = KeyIndex {
            strategy,
            keys: HashMap::with_capacity(existing.len()),
        };
        for row in existing {
            index.insert(row);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn lookup(&self, candidate: &ClassifiedRow) -> Lookup {
        match self.keys.get(&DedupKey::of(candidate, self.strategy)) {
            None => Lookup::New,
            Some(print) if *print == fingerprint(candidate) => Lookup::Duplicate,
            Some(_) => Lookup::Conflicting,
        }
    }

    pub fn contains(&self, candidate: &ClassifiedRow) -> bool {
        self.lookup(candidate) != Lookup::New
    }

    /// Returns false if the key was already present; the first row wins.
    pub fn insert(&mut self, row: &ClassifiedRow) -> bool {
        let key = DedupKey::of(row, self.strategy);
        if self.keys.contains_key(&key) {
            return false;
        }
        self.keys.insert(key, fingerprint(row));
        true
    }
}

/// One-off check of a candidate against a ledger. Callers checking many
/// candidates should build a `KeyIndex` once instead.
pub fn is_duplicate(candidate: &ClassifiedRow, existing: &Ledger, strategy: DedupStrategy) -> bool {
    let key = DedupKey::of(candidate, strategy);
    existing.iter().any(|row| DedupKey::of(row, strategy) == key)
}
