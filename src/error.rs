//! Error taxonomy shared by the runner, parsers, orchestrator and ISP detector.
//!
//! Only `Configuration` and `InvalidTarget` ever reach the caller of
//! [`crate::run_diagnostics`]. Every other variant is recorded as the terminal
//! status of a test unit or swallowed as a missing ISP signal.

use serde::{Deserialize, Serialize};

/// Why a parser could not extract anything usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailure {
    /// Output was present but no line matched a known pattern
    UnrecognizedFormat,
    /// Throughput output ended without a summary
    NoSummary,
    /// The program printed nothing on stdout
    EmptyOutput,
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UnrecognizedFormat => "unrecognized-format",
            Self::NoSummary => "no-summary",
            Self::EmptyOutput => "empty-output",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DiagError {
    #[error("process timed out after {elapsed_ms}ms")]
    ProcessTimeout { elapsed_ms: u64 },

    #[error("program not found: {program}")]
    ProgramNotFound { program: String },

    #[error("parse failure: {0}")]
    ParseFailure(ParseFailure),

    #[error("tool exited with {}: {detail}", describe_exit(.exit_code))]
    ToolFailed {
        exit_code: Option<i32>,
        detail: String,
    },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("DNS resolution failed: {0}")]
    DnsResolutionFailure(String),

    #[error("cancelled before completion")]
    Cancelled,

    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "signal".to_string(),
    }
}

impl DiagError {
    /// Whether this error aborts a whole run rather than a single unit
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvalidTarget { .. })
    }
}

impl From<ParseFailure> for DiagError {
    fn from(failure: ParseFailure) -> Self {
        Self::ParseFailure(failure)
    }
}
