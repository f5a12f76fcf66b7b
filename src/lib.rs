//! Network path diagnostics.
//!
//! Runs `ping`, `traceroute`/`tracert`, `mtr` and `speedtest-cli` against a
//! set of targets, parses their text output into typed measurements, detects
//! the upstream provider from independent weak signals and folds everything
//! into an immutable [`state::DiagnosticReport`].

pub mod config;
pub mod diagnose;
pub mod error;
pub mod export;
pub mod lookup;
pub mod parse;
pub mod probe;
pub mod state;
pub mod trace;

pub use config::DiagnosticsConfig;
pub use diagnose::{Diagnostics, run_diagnostics};
pub use error::{DiagError, ParseFailure};
pub use state::{DiagnosticKind, DiagnosticReport, Target};
