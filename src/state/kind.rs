use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four supported diagnostic test types
///
/// Ordering is the order tests appear in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// `ping`
    LatencyProbe,
    /// `traceroute` / `tracert`
    RouteTrace,
    /// `mtr` report mode
    CombinedTrace,
    /// `speedtest-cli`
    ThroughputTest,
}

impl DiagnosticKind {
    pub const ALL: [DiagnosticKind; 4] = [
        Self::LatencyProbe,
        Self::RouteTrace,
        Self::CombinedTrace,
        Self::ThroughputTest,
    ];

    /// Short label used in logs and reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::LatencyProbe => "ping",
            Self::RouteTrace => "traceroute",
            Self::CombinedTrace => "mtr",
            Self::ThroughputTest => "speedtest",
        }
    }

    /// Whether the test measures the path to a specific target.
    ///
    /// Throughput tests measure the local uplink against a server the tool
    /// picks itself, so they run once per invocation.
    pub fn is_target_scoped(&self) -> bool {
        !matches!(self, Self::ThroughputTest)
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DiagnosticKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "ping" | "latency" | "latency_probe" => Ok(Self::LatencyProbe),
            "traceroute" | "tracert" | "trace" | "route" | "route_trace" => Ok(Self::RouteTrace),
            "mtr" | "combined" | "combined_trace" => Ok(Self::CombinedTrace),
            "speedtest" | "speed" | "throughput" | "throughput_test" => Ok(Self::ThroughputTest),
            other => Err(format!(
                "Unknown test kind: {}. Use ping, traceroute, mtr or speedtest",
                other
            )),
        }
    }
}
