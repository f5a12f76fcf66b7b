use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

mod cli;

use cli::{Args, OutputFormat};
use netdiag::config::DiagnosticsConfig;
use netdiag::export::{export_csv, export_json, generate_report, load_json};
use netdiag::state::DiagnosticReport;
use netdiag::Diagnostics;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    init_tracing(args.log_filter());

    // Replay mode re-renders a saved report without running anything
    if let Some(ref replay_path) = args.replay {
        let report = load_report(replay_path)?;
        return write_output(&args, &report);
    }

    let mut config = DiagnosticsConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    let targets = args.targets(&config)?;
    let kinds = args.kinds();

    // Cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing with partial results");
            cancel_clone.cancel();
        }
    });

    let report = Diagnostics::new(config)
        .with_cancel(cancel)
        .run(&targets, &kinds)
        .await
        .context("Diagnostics could not start")?;

    write_output(&args, &report)
}

/// Logs go to stderr so stdout stays clean for the report
fn init_tracing(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}

/// Load a report from a JSON file
fn load_report(path: &Path) -> Result<DiagnosticReport> {
    const MAX_REPLAY_SIZE: u64 = 10 * 1024 * 1024; // 10MB

    let file = File::open(path)
        .with_context(|| format!("Failed to open replay file: {}", path.display()))?;

    // Check file size to prevent DoS via huge JSON
    let metadata = file
        .metadata()
        .with_context(|| format!("Failed to read replay file metadata: {}", path.display()))?;
    if metadata.len() > MAX_REPLAY_SIZE {
        anyhow::bail!("Replay file too large (max 10MB): {}", path.display());
    }

    load_json(BufReader::new(file))
        .with_context(|| format!("Failed to parse replay file: {}", path.display()))
}

fn write_output(args: &Args, report: &DiagnosticReport) -> Result<()> {
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            render(args.format(), report, &mut writer)?;
            writer.flush()?;
            eprintln!("Saved to {}", path.display());
            Ok(())
        }
        None => render(args.format(), report, std::io::stdout().lock()),
    }
}

fn render<W: Write>(format: OutputFormat, report: &DiagnosticReport, writer: W) -> Result<()> {
    match format {
        OutputFormat::Json => export_json(report, writer),
        OutputFormat::Csv => export_csv(report, writer),
        OutputFormat::Report => generate_report(report, writer).map_err(Into::into),
    }
}
