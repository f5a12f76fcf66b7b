use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::{DiagnosticKind, Measurement, RawExecution, Target};
use crate::error::DiagError;

/// Why a run with usable data is still not fully trustworthy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// The process was interrupted; records are a prefix of the full output
    PartialData,
    /// The summary was missing figures the tool normally reports
    IncompleteSummary,
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PartialData => write!(f, "partial data"),
            Self::IncompleteSummary => write!(f, "incomplete summary"),
        }
    }
}

/// Terminal status of one test unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Status {
    Ok,
    Degraded(DegradedReason),
    Failed(DiagError),
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Ok or Degraded: the run produced a measurement worth reporting
    pub fn is_usable(&self) -> bool {
        !self.is_failed()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Degraded(_) => "degraded",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Degraded(reason) => write!(f, "degraded ({})", reason),
            Self::Failed(err) => write!(f, "failed ({})", err),
        }
    }
}

/// Outcome of running one diagnostic kind against one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRun {
    pub target: Target,
    pub kind: DiagnosticKind,
    pub measurement: Option<Measurement>,
    pub status: Status,
    /// Absent only when the unit never started
    pub raw: Option<Arc<RawExecution>>,
    /// Attempts made, 0 when the unit never started
    pub attempts: u32,
}

impl TestRun {
    /// A unit that was cancelled before its first attempt
    pub fn not_started(target: Target, kind: DiagnosticKind) -> Self {
        Self {
            target,
            kind,
            measurement: None,
            status: Status::Failed(DiagError::Cancelled),
            raw: None,
            attempts: 0,
        }
    }
}
