//! Output parsers, one per diagnostic kind.
//!
//! Each parser skips lines it does not recognize and only reports failure
//! when nothing usable was extracted. The status policy below turns the
//! extraction result plus the execution outcome into a terminal status.

pub mod combined;
pub mod latency;
pub mod route;
pub mod throughput;
pub mod units;

use crate::error::{DiagError, ParseFailure};
use crate::state::{Completion, DegradedReason, DiagnosticKind, Measurement, RawExecution, Status};

/// Measurement (if any) and status derived from one execution
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutcome {
    pub measurement: Option<Measurement>,
    pub status: Status,
}

impl ParseOutcome {
    fn failed(error: DiagError) -> Self {
        Self {
            measurement: None,
            status: Status::Failed(error),
        }
    }
}

/// Interpret the output of a `kind` execution
pub fn parse(kind: DiagnosticKind, raw: &RawExecution) -> ParseOutcome {
    if raw.completion == Completion::ProgramNotFound {
        return ParseOutcome::failed(DiagError::ProgramNotFound {
            program: raw.command.program.clone(),
        });
    }

    let (measurement, incomplete) = match kind {
        DiagnosticKind::LatencyProbe => (latency::extract(&raw.stdout).map(Measurement::Latency), false),
        DiagnosticKind::RouteTrace => (route::extract(&raw.stdout).map(Measurement::Route), false),
        DiagnosticKind::CombinedTrace => {
            (combined::extract(&raw.stdout).map(Measurement::Combined), false)
        }
        DiagnosticKind::ThroughputTest => match throughput::extract(&raw.stdout) {
            Some(m) => {
                let incomplete = m.upload_bps.is_none() || m.latency.is_none();
                (Some(Measurement::Throughput(m)), incomplete)
            }
            None => (None, false),
        },
    };

    match measurement {
        Some(measurement) => {
            let status = if raw.interrupted() {
                Status::Degraded(DegradedReason::PartialData)
            } else if incomplete {
                Status::Degraded(DegradedReason::IncompleteSummary)
            } else {
                Status::Ok
            };
            ParseOutcome {
                measurement: Some(measurement),
                status,
            }
        }
        None => ParseOutcome::failed(no_records(kind, raw)),
    }
}

/// Error for an execution that yielded zero records
fn no_records(kind: DiagnosticKind, raw: &RawExecution) -> DiagError {
    match raw.completion {
        Completion::TimedOut => {
            return DiagError::ProcessTimeout {
                elapsed_ms: u64::try_from(raw.duration.as_millis()).unwrap_or(u64::MAX),
            };
        }
        Completion::Killed => return DiagError::Cancelled,
        Completion::Completed | Completion::ProgramNotFound => {}
    }

    if raw.stdout.trim().is_empty() {
        if raw.exit_code == Some(0) {
            ParseFailure::EmptyOutput.into()
        } else {
            DiagError::ToolFailed {
                exit_code: raw.exit_code,
                detail: raw.stderr_summary(),
            }
        }
    } else if kind == DiagnosticKind::ThroughputTest {
        ParseFailure::NoSummary.into()
    } else {
        ParseFailure::UnrecognizedFormat.into()
    }
}
