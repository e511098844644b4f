use crate::dedup::DedupStrategy;
use crate::openai::OpenAiConfig;
use crate::pipeline::PipelineConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// A century of hours. Windows beyond that would reach past any mail.
const MAX_WINDOW_HOURS: i64 = 24 * 366 * 100;

#[derive(Debug, Parser)]
#[clap(name = "jobmail-ledger")]
#[clap(author, version, about)]
pub struct Args {
    /// Path to the maildir holding the received mails.
    pub maildir: PathBuf,
    /// CSV file the classified mails are recorded in.
    #[clap(long, default_value = "job_applications.csv")]
    pub ledger: PathBuf,
    /// Only look at mails received within this many hours.
    #[clap(long, default_value_t = 24, value_parser = clap::value_parser!(u32).range(1..=MAX_WINDOW_HOURS))]
    pub window_hours: u32,
    /// How two mails are recognised as the same one.
    #[clap(long, value_enum, default_value_t = DedupStrategy::Composite)]
    pub dedup_key: DedupStrategy,
    /// Do not record mails classified as irrelevant.
    #[clap(long)]
    pub drop_irrelevant: bool,
    /// Mails from senders containing this text are irrelevant without
    /// asking the model. May be repeated.
    #[clap(long = "ignore-sender", default_values_t = ["noreply".to_string(), "github.com".to_string()])]
    pub ignored_senders: Vec<String>,
    /// API key for the chat completions endpoint.
    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,
    /// Base URL of the chat completions API.
    #[clap(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub api_base: String,
    /// Model used to classify mails.
    #[clap(long, default_value = "gpt-4o")]
    pub model: String,
    /// Give up on a classification request after this many seconds.
    #[clap(long, default_value_t = 30)]
    pub timeout_secs: u64,
    /// Suppress any progress output if set.
    #[clap(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            fetch_window: chrono::Duration::hours(i64::from(self.window_hours)),
            dedup_strategy: self.dedup_key,
            drop_irrelevant: self.drop_irrelevant,
            quiet: self.quiet,
        }
    }

    pub fn openai_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            api_key: self.api_key.clone(),
            api_base: self.api_base.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}
