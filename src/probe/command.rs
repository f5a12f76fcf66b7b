//! Platform-specific command lines for each diagnostic kind.

use crate::config::KindSettings;
use crate::state::{CommandSpec, DiagnosticKind, Target};

/// Target platform for command construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    fn default_program(&self, kind: DiagnosticKind, target: &Target) -> &'static str {
        match (kind, self) {
            (DiagnosticKind::LatencyProbe, Self::MacOs) if target.is_ipv6() => "ping6",
            (DiagnosticKind::LatencyProbe, _) => "ping",
            (DiagnosticKind::RouteTrace, Self::Windows) => "tracert",
            (DiagnosticKind::RouteTrace, Self::MacOs) if target.is_ipv6() => "traceroute6",
            (DiagnosticKind::RouteTrace, _) => "traceroute",
            (DiagnosticKind::CombinedTrace, _) => "mtr",
            (DiagnosticKind::ThroughputTest, _) => "speedtest-cli",
        }
    }
}

/// Build the command for one test unit on the current platform
pub fn build(kind: DiagnosticKind, target: &Target, settings: &KindSettings) -> CommandSpec {
    build_for(Platform::current(), kind, target, settings)
}

pub fn build_for(
    platform: Platform,
    kind: DiagnosticKind,
    target: &Target,
    settings: &KindSettings,
) -> CommandSpec {
    let program = settings
        .program
        .clone()
        .unwrap_or_else(|| platform.default_program(kind, target).to_string());
    let count = settings.count.max(1).to_string();
    let host = target.as_str().to_string();

    let args = match (kind, platform) {
        (DiagnosticKind::LatencyProbe, Platform::Windows) => vec!["-n".into(), count, host],
        (DiagnosticKind::LatencyProbe, _) => vec!["-c".into(), count, host],
        (DiagnosticKind::RouteTrace, Platform::Windows) => {
            vec!["-d".into(), "-h".into(), count, host]
        }
        (DiagnosticKind::RouteTrace, _) => vec!["-n".into(), "-m".into(), count, host],
        // report, wide, AS lookup, show names and IPs
        (DiagnosticKind::CombinedTrace, _) => {
            vec!["-r".into(), "-w".into(), "-z".into(), "-b".into(), "-c".into(), count, host]
        }
        (DiagnosticKind::ThroughputTest, _) => vec!["--json".into()],
    };

    CommandSpec { program, args }
}
