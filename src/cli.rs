use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::path::{Path, PathBuf};
use std::time::Duration;

use netdiag::config::DiagnosticsConfig;
use netdiag::state::DiagnosticKind;

/// Network path diagnostics: ping, traceroute, mtr and speed test with ISP detection
#[derive(Parser, Debug, Clone)]
#[command(name = "netdiag")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target hosts to test (IP address or hostname); defaults to the configured targets
    pub targets: Vec<String>,

    /// Read targets from a file, one per line (`#` starts a comment)
    #[arg(short = 'f', long = "target-file")]
    pub target_file: Option<PathBuf>,

    /// Test kinds to run (ping, traceroute, mtr, speedtest); repeatable, default all
    #[arg(short = 'k', long = "kind")]
    pub kinds: Vec<DiagnosticKind>,

    /// Config file (default: <config dir>/netdiag/config.toml)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Number of tests running concurrently
    #[arg(long = "workers")]
    pub workers: Option<usize>,

    /// Attempts per test before giving up
    #[arg(long = "attempts")]
    pub attempts: Option<u32>,

    /// Stop the whole run after this many seconds, keeping finished results
    #[arg(long = "deadline")]
    pub deadline: Option<f64>,

    /// Skip ISP detection
    #[arg(long = "no-isp")]
    pub no_isp: bool,

    /// Skip reverse DNS during ISP detection
    #[arg(long = "no-rdns")]
    pub no_rdns: bool,

    /// Output JSON
    #[arg(long = "json")]
    pub json: bool,

    /// Output CSV
    #[arg(long = "csv")]
    pub csv: bool,

    /// Output a text report (default)
    #[arg(long = "report")]
    pub report: bool,

    /// Write output to a file instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Re-render a saved JSON report instead of running tests
    #[arg(long = "replay")]
    pub replay: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

/// Output format selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
    Report,
}

impl Args {
    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        let formats = [self.json, self.csv, self.report].iter().filter(|f| **f).count();
        if formats > 1 {
            return Err("Only one of --json, --csv and --report can be used".into());
        }

        if self.workers == Some(0) {
            return Err("Workers must be at least 1".into());
        }

        if self.attempts == Some(0) {
            return Err("Attempts must be at least 1".into());
        }

        if let Some(deadline) = self.deadline
            && !(deadline > 0.0 && Duration::try_from_secs_f64(deadline).is_ok())
        {
            return Err("Deadline must be a positive number of seconds".into());
        }

        if self.target_file.is_some() && !self.targets.is_empty() {
            return Err("--target-file cannot be combined with targets".into());
        }

        if self.replay.is_some() && (!self.targets.is_empty() || self.target_file.is_some()) {
            return Err("--replay does not take targets".into());
        }

        Ok(())
    }

    pub fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else if self.csv {
            OutputFormat::Csv
        } else {
            OutputFormat::Report
        }
    }

    /// Requested kinds, all of them when none were given
    pub fn kinds(&self) -> Vec<DiagnosticKind> {
        if self.kinds.is_empty() {
            DiagnosticKind::ALL.to_vec()
        } else {
            self.kinds.clone()
        }
    }

    /// Command-line targets, then the target file, then the configured ones
    pub fn targets(&self, config: &DiagnosticsConfig) -> Result<Vec<String>> {
        if !self.targets.is_empty() {
            return Ok(self.targets.clone());
        }
        match &self.target_file {
            Some(path) => load_targets(path),
            None => Ok(config.targets.clone()),
        }
    }

    /// Default log filter for the verbosity level
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "netdiag=warn",
            1 => "netdiag=info",
            _ => "netdiag=debug",
        }
    }

    /// Overlay command-line overrides on the loaded config
    pub fn apply(&self, config: &mut DiagnosticsConfig) {
        if let Some(workers) = self.workers {
            config.worker_pool_size = workers;
        }
        if let Some(attempts) = self.attempts {
            for kind in DiagnosticKind::ALL {
                config.kind_mut(kind).max_attempts = attempts;
            }
        }
        if let Some(deadline) = self.deadline
            && let Ok(deadline) = Duration::try_from_secs_f64(deadline)
        {
            config.overall_deadline = Some(deadline);
        }
        if self.no_isp {
            config.isp.enabled = false;
        }
        if self.no_rdns {
            config.isp.reverse_dns = false;
        }
    }
}

/// One target per line; blank lines and `#` comments are skipped
fn load_targets(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read target file: {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}
