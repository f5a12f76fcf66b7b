//! Runtime configuration.
//!
//! Built from defaults, overlaid with ~/.config/netdiag/config.toml (or an
//! explicit file), then with CLI flags.

use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DiagError;
use crate::state::DiagnosticKind;

/// Default lookup services for public IP detection
pub const DEFAULT_LOOKUP_SERVICES: [&str; 3] = [
    "https://httpbin.org/ip",
    "https://api.ipify.org",
    "https://ipinfo.io/ip",
];

/// Default targets when none are given
pub const DEFAULT_TARGETS: [&str; 4] = ["8.8.8.8", "1.1.1.1", "208.67.222.222", "9.9.9.9"];

/// Per-kind execution settings
#[derive(Debug, Clone, PartialEq)]
pub struct KindSettings {
    /// Deadline for one attempt
    pub timeout: Duration,
    /// Attempts before the unit is finalized as failed
    pub max_attempts: u32,
    /// Program to run instead of the platform default
    pub program: Option<String>,
    /// Probe count (ping, mtr) or max hops (traceroute); unused by speedtest
    pub count: u32,
}

impl KindSettings {
    fn new(timeout_secs: u64, count: u32) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
            max_attempts: 2,
            program: None,
            count,
        }
    }
}

/// ISP detection settings
#[derive(Debug, Clone, PartialEq)]
pub struct IspSettings {
    pub enabled: bool,
    pub reverse_dns: bool,
    pub lookup_services: Vec<String>,
    pub lookup_timeout: Duration,
    /// Minimum confidence for a verdict to count as reliable
    pub confidence_threshold: f64,
    /// Include the built-in provider catalog
    pub builtin_catalog: bool,
    /// Provider -> CIDR ranges
    pub ranges: BTreeMap<String, Vec<String>>,
    /// Provider -> hostname suffixes
    pub hostnames: BTreeMap<String, Vec<String>>,
    /// Provider -> alternative names reported by lookup services
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl Default for IspSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            reverse_dns: true,
            lookup_services: DEFAULT_LOOKUP_SERVICES.iter().map(|s| s.to_string()).collect(),
            lookup_timeout: Duration::from_secs(10),
            confidence_threshold: 0.5,
            builtin_catalog: true,
            ranges: BTreeMap::new(),
            hostnames: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }
}

/// Full configuration of a diagnostics run
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsConfig {
    pub targets: Vec<String>,
    pub ping: KindSettings,
    pub traceroute: KindSettings,
    pub mtr: KindSettings,
    pub speedtest: KindSettings,
    /// Concurrent test units
    pub worker_pool_size: usize,
    /// Pause between attempts of a failed unit
    pub retry_delay: Duration,
    /// Cancels everything still running once reached
    pub overall_deadline: Option<Duration>,
    pub isp: IspSettings,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            targets: DEFAULT_TARGETS.iter().map(|s| s.to_string()).collect(),
            ping: KindSettings::new(10, 4),
            traceroute: KindSettings::new(60, 30),
            mtr: KindSettings::new(90, 10),
            speedtest: KindSettings::new(120, 0),
            worker_pool_size: 3,
            retry_delay: Duration::ZERO,
            overall_deadline: None,
            isp: IspSettings::default(),
        }
    }
}

impl DiagnosticsConfig {
    pub fn kind(&self, kind: DiagnosticKind) -> &KindSettings {
        match kind {
            DiagnosticKind::LatencyProbe => &self.ping,
            DiagnosticKind::RouteTrace => &self.traceroute,
            DiagnosticKind::CombinedTrace => &self.mtr,
            DiagnosticKind::ThroughputTest => &self.speedtest,
        }
    }

    pub fn kind_mut(&mut self, kind: DiagnosticKind) -> &mut KindSettings {
        match kind {
            DiagnosticKind::LatencyProbe => &mut self.ping,
            DiagnosticKind::RouteTrace => &mut self.traceroute,
            DiagnosticKind::CombinedTrace => &mut self.mtr,
            DiagnosticKind::ThroughputTest => &mut self.speedtest,
        }
    }

    /// Default config file path: ~/.config/netdiag/config.toml
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("netdiag").join("config.toml"))
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse a TOML document and overlay it on the defaults
    pub fn from_toml(text: &str) -> Result<Self, DiagError> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| DiagError::Configuration(e.to_string()))?;
        let mut config = Self::default();
        file.apply(&mut config)?;
        Ok(config)
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> Result<(), DiagError> {
        if self.worker_pool_size == 0 {
            return Err(DiagError::Configuration(
                "worker_pool_size must be at least 1".into(),
            ));
        }

        for kind in DiagnosticKind::ALL {
            let settings = self.kind(kind);
            if settings.max_attempts == 0 {
                return Err(DiagError::Configuration(format!(
                    "{}: max_attempts must be at least 1",
                    kind
                )));
            }
            if settings.timeout.is_zero() {
                return Err(DiagError::Configuration(format!(
                    "{}: timeout must be positive",
                    kind
                )));
            }
            if settings.program.as_deref().is_some_and(|p| p.trim().is_empty()) {
                return Err(DiagError::Configuration(format!(
                    "{}: program override cannot be empty",
                    kind
                )));
            }
        }

        if self.overall_deadline.is_some_and(|d| d.is_zero()) {
            return Err(DiagError::Configuration(
                "overall_deadline must be positive".into(),
            ));
        }

        let threshold = self.isp.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DiagError::Configuration(format!(
                "confidence_threshold must be within 0..=1, got {}",
                threshold
            )));
        }
        if self.isp.enabled && self.isp.lookup_timeout.is_zero() {
            return Err(DiagError::Configuration(
                "isp.lookup_timeout must be positive".into(),
            ));
        }

        Ok(())
    }
}

/// On-disk form: every field optional, durations in seconds
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    targets: Option<Vec<String>>,
    worker_pool_size: Option<usize>,
    retry_delay: Option<f64>,
    overall_deadline: Option<f64>,
    ping: Option<KindFile>,
    traceroute: Option<KindFile>,
    mtr: Option<KindFile>,
    speedtest: Option<KindFile>,
    isp: Option<IspFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct KindFile {
    timeout: Option<f64>,
    max_attempts: Option<u32>,
    program: Option<String>,
    count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct IspFile {
    enabled: Option<bool>,
    reverse_dns: Option<bool>,
    lookup_services: Option<Vec<String>>,
    lookup_timeout: Option<f64>,
    confidence_threshold: Option<f64>,
    builtin_catalog: Option<bool>,
    ranges: BTreeMap<String, Vec<String>>,
    hostnames: BTreeMap<String, Vec<String>>,
    aliases: BTreeMap<String, Vec<String>>,
}

impl ConfigFile {
    fn apply(self, config: &mut DiagnosticsConfig) -> Result<(), DiagError> {
        if let Some(targets) = self.targets {
            config.targets = targets;
        }
        if let Some(size) = self.worker_pool_size {
            config.worker_pool_size = size;
        }
        if let Some(secs) = self.retry_delay {
            config.retry_delay = seconds("retry_delay", secs)?;
        }
        if let Some(secs) = self.overall_deadline {
            config.overall_deadline = Some(seconds("overall_deadline", secs)?);
        }

        let kinds = [
            (DiagnosticKind::LatencyProbe, self.ping),
            (DiagnosticKind::RouteTrace, self.traceroute),
            (DiagnosticKind::CombinedTrace, self.mtr),
            (DiagnosticKind::ThroughputTest, self.speedtest),
        ];
        for (kind, file) in kinds {
            if let Some(file) = file {
                file.apply(kind, config.kind_mut(kind))?;
            }
        }

        if let Some(isp) = self.isp {
            isp.apply(&mut config.isp)?;
        }
        Ok(())
    }
}

impl KindFile {
    fn apply(self, kind: DiagnosticKind, settings: &mut KindSettings) -> Result<(), DiagError> {
        if let Some(secs) = self.timeout {
            settings.timeout = seconds(&format!("{}.timeout", kind), secs)?;
        }
        if let Some(attempts) = self.max_attempts {
            settings.max_attempts = attempts;
        }
        if self.program.is_some() {
            settings.program = self.program;
        }
        if let Some(count) = self.count {
            settings.count = count;
        }
        Ok(())
    }
}

impl IspFile {
    fn apply(self, isp: &mut IspSettings) -> Result<(), DiagError> {
        if let Some(enabled) = self.enabled {
            isp.enabled = enabled;
        }
        if let Some(rdns) = self.reverse_dns {
            isp.reverse_dns = rdns;
        }
        if let Some(services) = self.lookup_services {
            isp.lookup_services = services;
        }
        if let Some(secs) = self.lookup_timeout {
            isp.lookup_timeout = seconds("isp.lookup_timeout", secs)?;
        }
        if let Some(threshold) = self.confidence_threshold {
            isp.confidence_threshold = threshold;
        }
        if let Some(builtin) = self.builtin_catalog {
            isp.builtin_catalog = builtin;
        }
        isp.ranges.extend(self.ranges);
        isp.hostnames.extend(self.hostnames);
        isp.aliases.extend(self.aliases);
        Ok(())
    }
}

fn seconds(field: &str, secs: f64) -> Result<Duration, DiagError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| DiagError::Configuration(format!("{}: invalid duration {}", field, secs)))
}
