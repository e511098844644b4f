use chrono::{DateTime, FixedOffset};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

/// A message as supplied by a fetcher. Never modified after fetching.
#[derive(Clone, Debug, PartialEq)]
pub struct RawMessage {
    /// Source-assigned identifier, unique within one fetch window.
    pub id: String,
    pub timestamp: DateTime<FixedOffset>,
    pub sender: String,
    pub subject: String,
    /// Truncated preview of the body.
    pub snippet: String,
}

/// The closed set of categories a ledger row can carry.
///
/// The display strings are part of the ledger format; renaming any of them
/// breaks every consumer of an existing ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "Application Submitted")]
    ApplicationSubmitted,
    #[serde(rename = "Interview Received")]
    InterviewReceived,
    #[serde(rename = "Rejection Notice")]
    RejectionNotice,
    #[serde(rename = "Follow-up Needed")]
    FollowUpNeeded,
    #[serde(rename = "Irrelevant")]
    Irrelevant,
}

impl Label {
    pub const ALL: [Label; 5] = [
        Label::ApplicationSubmitted,
        Label::InterviewReceived,
        Label::RejectionNotice,
        Label::FollowUpNeeded,
        Label::Irrelevant,
    ];

    /// The label assigned when a message cannot be classified.
    pub const FALLBACK: Label = Label::Irrelevant;

    pub fn as_str(self) -> &'static str {
        match self {
            Label::ApplicationSubmitted => "Application Submitted",
            Label::InterviewReceived => "Interview Received",
            Label::RejectionNotice => "Rejection Notice",
            Label::FollowUpNeeded => "Follow-up Needed",
            Label::Irrelevant => "Irrelevant",
        }
    }

    /// Matches `s` exactly against the label strings. Callers decide how much
    /// normalisation to apply beforehand.
    pub fn from_exact(s: &str) -> Option<Label> {
        Label::ALL.iter().copied().find(|label| label.as_str() == s)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the ledger, produced from exactly one `RawMessage`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRow {
    #[serde(rename = "Date", deserialize_with = "deserialize_date")]
    pub timestamp: DateTime<FixedOffset>,
    #[serde(rename = "Category")]
    pub label: Label,
    #[serde(rename = "Sender")]
    pub sender: String,
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Snippet")]
    pub snippet: String,
    #[serde(rename = "Message ID", default)]
    pub source_id: Option<String>,
}

impl ClassifiedRow {
    pub fn new(message: &RawMessage, label: Label) -> Self {
        ClassifiedRow {
            timestamp: message.timestamp,
            label,
            sender: message.sender.clone(),
            subject: message.subject.clone(),
            snippet: message.snippet.clone(),
            source_id: if message.id.is_empty() {
                None
            } else {
                Some(message.id.clone())
            },
        }
    }
}

/// Rows are written with RFC 3339 dates, but ledgers started by hand or by
/// the Gmail-based tracker carry the raw `Date` header of the mail.
fn deserialize_date<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&value)
        .ok()
        .or_else(|| crate::collect::parse_date(&value))
        .ok_or_else(|| de::Error::custom(format!("invalid date {:?}", value)))
}

/// The persisted, ordered sequence of rows.
pub type Ledger = Vec<ClassifiedRow>;
