use crate::dedup::{DedupStrategy, KeyIndex, Lookup};
use crate::message::{ClassifiedRow, Ledger};
use tracing::warn;

#[derive(Debug, PartialEq)]
pub struct MergeOutcome {
    pub ledger: Ledger,
    pub appended: usize,
    /// Rows dropped because their key was already present, either in the
    /// existing ledger or earlier in the same batch.
    pub duplicates: usize,
}

/// Appends the rows of `new_rows` whose key is not yet present, in batch
/// order. Existing rows are neither reordered nor modified.
pub fn merge(existing: Ledger, new_rows: Vec<ClassifiedRow>, strategy: DedupStrategy) -> MergeOutcome {
    let mut index = KeyIndex::new(&existing, strategy);
    let mut ledger = existing;
    let mut appended = 0;
    let mut duplicates = 0;

    for row in new_rows {
        match index.lookup(&row) {
            Lookup::New => {
                index.insert(&row);
                ledger.push(row);
                appended += 1;
            }
            Lookup::Duplicate => duplicates += 1,
            Lookup::Conflicting => {
                warn!(
                    "{:?} from {:?} on {} is already in the ledger \
                     but has a different snippet",
                    row.subject,
                    row.sender,
                    row.timestamp.naive_utc().date()
                );
                duplicates += 1;
            }
        }
    }

    MergeOutcome {
        ledger,
        appended,
        duplicates,
    }
}
