use anyhow::Context;
use chrono::Utc;
use jobmail_ledger::args::Args;
use jobmail_ledger::classify::Classifier;
use jobmail_ledger::collect::MaildirSource;
use jobmail_ledger::openai::OpenAiBackend;
use jobmail_ledger::pipeline::Pipeline;
use jobmail_ledger::store::CsvLedgerStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    do_main(&Args::parse_args())
}

fn do_main(args: &Args) -> anyhow::Result<()> {
    let backend = OpenAiBackend::new(args.openai_config())
        .context("Failed to set up the classification client")?;
    let classifier = Classifier::new(backend, &args.ignored_senders);
    let source = MaildirSource::new(&args.maildir, args.quiet);
    let store = CsvLedgerStore::new(&args.ledger);

    info!("Tracking mails from {:?} into {:?}", args.maildir, args.ledger);
    let report = Pipeline::new(args.pipeline_config())
        .run(&source, &classifier, &store, Utc::now().fixed_offset())?;

    println!("{}", report);
    if !report.warnings.is_empty() {
        eprintln!("{} warning(s) during the run", report.warnings.len());
    }
    Ok(())
}
