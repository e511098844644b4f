//! One run of the tracker: fetch, classify, deduplicate, merge and store.
//!
//! Everything a single message can get wrong (a missing sender, a failed or
//! nonsensical classification) is handled here and reported as a warning.
//! Failures of the fetcher or the store abort the run before anything is
//! written.

use crate::classify::{Classification, Classifier, ClassifierBackend, FallbackReason};
use crate::collect::MessageSource;
use crate::dedup::DedupStrategy;
use crate::error::RunError;
use crate::merge::merge;
use crate::message::{ClassifiedRow, Label, RawMessage};
use crate::store::LedgerStore;
use crate::utils;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// How far back from now messages are fetched.
    pub fetch_window: Duration,
    pub dedup_strategy: DedupStrategy,
    /// Leave rows labelled `Irrelevant` out of the ledger.
    pub drop_irrelevant: bool,
    pub quiet: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            fetch_window: Duration::hours(24),
            dedup_strategy: DedupStrategy::Composite,
            drop_irrelevant: false,
            quiet: true,
        }
    }
}

/// A problem with one message that did not stop the run.
#[derive(Clone, Debug, PartialEq)]
pub enum RunWarning {
    /// The message had no sender and was left out.
    MalformedMessage { id: String },
    /// The message was labelled with the fallback label.
    ClassificationFallback { id: String, reason: FallbackReason },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunWarning::MalformedMessage { id } => {
                write!(f, "skipped message {} without a sender", id)
            }
            RunWarning::ClassificationFallback { id, reason } => match reason {
                FallbackReason::Backend(e) => {
                    write!(f, "could not classify message {}: {}", id, e)
                }
                FallbackReason::Unparseable(reply) => {
                    write!(f, "unexpected classification {:?} for message {}", reply, id)
                }
                FallbackReason::MissingSender => {
                    write!(f, "message {} has no sender", id)
                }
                FallbackReason::AutomatedSender => {
                    write!(f, "message {} is from an automated sender", id)
                }
            },
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct RunReport {
    pub fetched: usize,
    /// Messages that received a label, fallbacks included.
    pub classified: usize,
    pub fallbacks: usize,
    pub skipped: usize,
    /// Irrelevant rows left out because of `drop_irrelevant`.
    pub filtered: usize,
    pub duplicates: usize,
    pub appended: usize,
    /// Whether the store was written to.
    pub written: bool,
    pub warnings: Vec<RunWarning>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "processed {}, classified {} ({} fallback), skipped {}, \
             duplicate {}, appended {}",
            self.fetched,
            self.classified,
            self.fallbacks,
            self.skipped,
            self.duplicates,
            self.appended
        )?;
        if self.filtered > 0 {
            write!(f, ", filtered {} irrelevant", self.filtered)?;
        }
        Ok(())
    }
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline { config }
    }

    /// Runs once for the window ending at `now`. Serialising runs against the
    /// same store is up to the caller.
    pub fn run<S, B, L>(
        &self,
        source: &S,
        classifier: &Classifier<B>,
        store: &L,
        now: DateTime<FixedOffset>,
    ) -> Result<RunReport, RunError>
    where
        S: MessageSource + ?Sized,
        B: ClassifierBackend,
        L: LedgerStore + ?Sized,
    {
        let existing = store.load().map_err(RunError::StoreRead)?;
        debug!("ledger has {} rows", existing.len());

        let since = now
            .checked_sub_signed(self.config.fetch_window)
            .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC.fixed_offset());
        let mut messages = source.fetch(since).map_err(RunError::Fetch)?;
        // Fetchers promise no order; classify oldest first so new rows are
        // appended chronologically.
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        let mut report = RunReport {
            fetched: messages.len(),
            ..RunReport::default()
        };
        info!("fetched {} messages", messages.len());

        let new_rows = self.classify_all(&messages, classifier, &mut report);

        let outcome = merge(existing, new_rows, self.config.dedup_strategy);
        report.duplicates = outcome.duplicates;
        report.appended = outcome.appended;

        if outcome.appended == 0 && store.exists() {
            info!("no new messages to record");
            return Ok(report);
        }
        store.save(&outcome.ledger).map_err(RunError::StoreWrite)?;
        report.written = true;
        Ok(report)
    }

    fn classify_all<B: ClassifierBackend>(
        &self,
        messages: &[RawMessage],
        classifier: &Classifier<B>,
        report: &mut RunReport,
    ) -> Vec<ClassifiedRow> {
        let progress = utils::create_progress_bar(self.config.quiet, messages.len());
        progress.set_message("Classifying");

        let mut rows = Vec::with_capacity(messages.len());
        for message in messages {
            progress.inc(1);
            if message.sender.trim().is_empty() {
                let warning = RunWarning::MalformedMessage {
                    id: message.id.clone(),
                };
                warn!("{}", warning);
                report.warnings.push(warning);
                report.skipped += 1;
                continue;
            }

            let classification = classifier.classify(message);
            report.classified += 1;
            if let Classification::Fallback { reason, .. } = &classification {
                report.fallbacks += 1;
                if reason.is_warning() {
                    let warning = RunWarning::ClassificationFallback {
                        id: message.id.clone(),
                        reason: reason.clone(),
                    };
                    warn!("{}", warning);
                    report.warnings.push(warning);
                }
            }

            let label = classification.label();
            debug!("{}: {:?} -> {}", message.id, message.subject, label);
            if label == Label::Irrelevant && self.config.drop_irrelevant {
                report.filtered += 1;
                continue;
            }
            rows.push(ClassifiedRow::new(message, label));
        }
        progress.finish_and_clear();
        rows
    }
}
