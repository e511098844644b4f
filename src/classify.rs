use crate::error::BackendError;
use crate::message::{Label, RawMessage};
use tracing::debug;

/// A chat prompt handed to a classification backend.
#[derive(Clone, Debug, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Something that can answer a classification prompt with free-form text,
/// usually a hosted language model.
pub trait ClassifierBackend {
    fn complete(&self, prompt: &Prompt) -> Result<String, BackendError>;
}

impl<'a, B: ClassifierBackend + ?Sized> ClassifierBackend for &'a B {
    fn complete(&self, prompt: &Prompt) -> Result<String, BackendError> {
        (**self).complete(prompt)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FallbackReason {
    /// The backend call failed or timed out.
    Backend(String),
    /// The backend answered with something outside the label set.
    Unparseable(String),
    MissingSender,
    /// Sender matched an ignore pattern; the backend was not asked.
    AutomatedSender,
}

impl FallbackReason {
    /// Whether the fallback indicates something the caller should hear about.
    pub fn is_warning(&self) -> bool {
        !matches!(self, FallbackReason::AutomatedSender)
    }
}

/// Outcome of classifying one message. Both variants carry a label from the
/// closed set, so callers can use `label()` without special-casing failures.
#[derive(Clone, Debug, PartialEq)]
pub enum Classification {
    Confident(Label),
    Fallback { label: Label, reason: FallbackReason },
}

impl Classification {
    fn fallback(reason: FallbackReason) -> Self {
        Classification::Fallback {
            label: Label::FALLBACK,
            reason,
        }
    }

    pub fn label(&self) -> Label {
        match self {
            Classification::Confident(label) => *label,
            Classification::Fallback { label, .. } => *label,
        }
    }
}

pub struct Classifier<B> {
    backend: B,
    ignored_senders: Vec<String>,
}

impl<B: ClassifierBackend> Classifier<B> {
    /// `ignored_senders` are case-insensitive substrings; a sender containing
    /// any of them is labelled irrelevant without asking the backend.
    pub fn new(backend: B, ignored_senders: &[String]) -> Self {
        Classifier {
            backend,
            ignored_senders: ignored_senders
                .iter()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_lowercase())
                .collect(),
        }
    }

    pub fn classify(&self, message: &RawMessage) -> Classification {
        if message.sender.trim().is_empty() {
            return Classification::fallback(FallbackReason::MissingSender);
        }
        let sender = message.sender.to_lowercase();
        if self.ignored_senders.iter().any(|p| sender.contains(p.as_str())) {
            debug!("{}: automated sender {:?}", message.id, message.sender);
            return Classification::fallback(FallbackReason::AutomatedSender);
        }

        let reply = match self.backend.complete(&build_prompt(message)) {
            Ok(reply) => reply,
            Err(e) => return Classification::fallback(FallbackReason::Backend(e.to_string())),
        };
        match parse_label(&reply) {
            Some(label) => Classification::Confident(label),
            None => Classification::fallback(FallbackReason::Unparseable(reply)),
        }
    }
}

const SYSTEM_PROMPT: &str = "You are an email classifier. \
Classify job-search emails into exactly one of the following categories:\n";

pub fn build_prompt(message: &RawMessage) -> Prompt {
    let mut system = SYSTEM_PROMPT.to_string();
    for label in Label::ALL.iter() {
        system.push_str("- ");
        system.push_str(label.as_str());
        system.push('\n');
    }
    system.push_str(
        "\nRules:\n\
         1. Return only the category name, with no extra words or formatting.\n\
         2. If unsure, return 'Irrelevant'.\n",
    );
    let user = format!(
        "Email Sender: {}\n\nEmail Subject: {}\n\nEmail Content: {}\n\n\
         What is the correct category?",
        message.sender, message.subject, message.snippet
    );
    Prompt { system, user }
}

/// Surrounding whitespace is tolerated; everything else must match a label
/// exactly, including case.
pub fn parse_label(reply: &str) -> Option<Label> {
    Label::from_exact(reply.trim())
}
