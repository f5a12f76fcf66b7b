use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use super::{DiagnosticKind, duration_ms, option_duration_ms};

/// One probe result: a round-trip time or a loss
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sample {
    Reply(#[serde(with = "duration_ms")] Duration),
    Lost,
}

impl Sample {
    pub fn rtt(&self) -> Option<Duration> {
        match self {
            Self::Reply(rtt) => Some(*rtt),
            Self::Lost => None,
        }
    }

    pub fn is_lost(&self) -> bool {
        matches!(self, Self::Lost)
    }
}

/// Coarse health classification of a measured path
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    Warning,
    Critical,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Latency summary over the replies of a sample set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    #[serde(with = "duration_ms")]
    pub min: Duration,
    #[serde(with = "duration_ms")]
    pub avg: Duration,
    #[serde(with = "duration_ms")]
    pub max: Duration,
    /// Population standard deviation (jitter)
    #[serde(with = "duration_ms")]
    pub stddev: Duration,
}

impl LatencyStats {
    /// Compute stats over RTTs; None when there are no replies
    pub fn from_rtts<I>(rtts: I) -> Option<Self>
    where
        I: IntoIterator<Item = Duration>,
    {
        let mut acc = RttAccumulator::default();
        for rtt in rtts {
            acc.record(rtt);
        }
        acc.finish()
    }
}

/// Welford's online mean/variance with min/max tracking
#[derive(Debug, Default)]
struct RttAccumulator {
    count: u64,
    min: Option<Duration>,
    max: Option<Duration>,
    mean: f64, // microseconds
    m2: f64,
}

impl RttAccumulator {
    fn record(&mut self, rtt: Duration) {
        self.count += 1;

        self.min = Some(self.min.map_or(rtt, |m| m.min(rtt)));
        self.max = Some(self.max.map_or(rtt, |m| m.max(rtt)));

        let micros = rtt.as_secs_f64() * 1_000_000.0;
        let delta = micros - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = micros - self.mean;
        self.m2 += delta * delta2;
    }

    fn finish(self) -> Option<LatencyStats> {
        let (min, max) = (self.min?, self.max?);
        let variance = if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        };
        Some(LatencyStats {
            min,
            avg: from_micros_f64(self.mean),
            max,
            stddev: from_micros_f64(variance.sqrt()),
        })
    }
}

fn from_micros_f64(micros: f64) -> Duration {
    if micros.is_finite() && micros > 0.0 {
        Duration::from_nanos((micros * 1000.0).round() as u64)
    } else {
        Duration::ZERO
    }
}

/// Result of a latency probe (`ping`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyMeasurement {
    /// Samples in probe order
    pub samples: Vec<Sample>,
    /// None when every probe was lost
    pub stats: Option<LatencyStats>,
    /// lost / total, in [0, 1]
    pub loss_ratio: f64,
}

impl LatencyMeasurement {
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        let lost = samples.iter().filter(|s| s.is_lost()).count();
        let loss_ratio = if samples.is_empty() {
            0.0
        } else {
            lost as f64 / samples.len() as f64
        };
        let stats = LatencyStats::from_rtts(samples.iter().filter_map(Sample::rtt));

        Self {
            samples,
            stats,
            loss_ratio,
        }
    }

    pub fn sent(&self) -> usize {
        self.samples.len()
    }

    pub fn received(&self) -> usize {
        self.samples.iter().filter(|s| !s.is_lost()).count()
    }

    /// Jitter is the standard deviation of the replies
    pub fn jitter(&self) -> Option<Duration> {
        self.stats.map(|s| s.stddev)
    }

    /// Total loss is critical, more than half lost is a warning
    pub fn health(&self) -> Health {
        if self.loss_ratio >= 1.0 {
            Health::Critical
        } else if self.loss_ratio > 0.5 {
            Health::Warning
        } else {
            Health::Healthy
        }
    }
}

/// One position along a traced route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteHop {
    pub index: u8,
    /// None for a hop that never answered
    pub address: Option<IpAddr>,
    pub hostname: Option<String>,
    /// Mean of the hop's replies
    #[serde(with = "option_duration_ms")]
    pub rtt: Option<Duration>,
    pub samples: Vec<Sample>,
}

impl RouteHop {
    pub fn is_responsive(&self) -> bool {
        self.address.is_some() || self.hostname.is_some()
    }
}

/// Result of a route trace (`traceroute` / `tracert`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMeasurement {
    pub hops: Vec<RouteHop>,
}

impl RouteMeasurement {
    /// Last hop that answered
    pub fn last_responsive(&self) -> Option<&RouteHop> {
        self.hops.iter().rev().find(|h| h.is_responsive())
    }

    /// Number of hops that never answered
    pub fn silent_hops(&self) -> usize {
        self.hops.iter().filter(|h| !h.is_responsive()).count()
    }
}

/// One hop of a combined trace with its latency figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedHop {
    pub index: u8,
    pub address: Option<IpAddr>,
    pub hostname: Option<String>,
    /// Origin AS as printed by the tool (e.g. "AS15169")
    pub asn: Option<String>,
    pub sent: u32,
    pub loss_ratio: f64,
    #[serde(with = "option_duration_ms")]
    pub last: Option<Duration>,
    /// None when every probe to the hop was lost
    pub latency: Option<LatencyStats>,
}

impl CombinedHop {
    pub fn is_silent(&self) -> bool {
        self.loss_ratio >= 1.0
    }
}

/// Result of a combined route/latency trace (`mtr`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedMeasurement {
    pub hops: Vec<CombinedHop>,
}

impl CombinedMeasurement {
    /// Highest loss ratio seen on any hop
    pub fn worst_loss(&self) -> f64 {
        self.hops.iter().map(|h| h.loss_ratio).fold(0.0, f64::max)
    }

    /// Mean of the average latency of hops that answered
    pub fn average_latency(&self) -> Option<Duration> {
        let avgs: Vec<Duration> = self
            .hops
            .iter()
            .filter_map(|h| h.latency.map(|l| l.avg))
            .collect();
        if avgs.is_empty() {
            return None;
        }
        Some(avgs.iter().sum::<Duration>() / avgs.len() as u32)
    }

    /// First hop where the path went fully dark
    pub fn first_silent_hop(&self) -> Option<&CombinedHop> {
        self.hops.iter().find(|h| h.is_silent())
    }

    /// Worst-hop loss above 20% is critical; above 5%, a hop above 10%
    /// or average latency above 200ms is a warning
    pub fn health(&self) -> Health {
        let worst = self.worst_loss();
        let slow = self
            .average_latency()
            .is_some_and(|avg| avg > Duration::from_millis(200));

        if self.hops.is_empty() || worst > 0.20 {
            Health::Critical
        } else if worst > 0.05 || slow || self.hops.iter().any(|h| h.loss_ratio > 0.10) {
            Health::Warning
        } else {
            Health::Healthy
        }
    }
}

/// Identity of the throughput test server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerIdentity {
    pub name: Option<String>,
    pub location: Option<String>,
    pub id: Option<String>,
}

impl ServerIdentity {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.location.is_none() && self.id.is_none()
    }
}

/// Result of a throughput test (`speedtest-cli`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputMeasurement {
    pub download_bps: f64,
    /// None when the tool skipped or never reached the upload phase
    pub upload_bps: Option<f64>,
    #[serde(with = "option_duration_ms")]
    pub latency: Option<Duration>,
    pub server: ServerIdentity,
}

impl ThroughputMeasurement {
    pub fn download_mbps(&self) -> f64 {
        self.download_bps / 1_000_000.0
    }

    pub fn upload_mbps(&self) -> Option<f64> {
        self.upload_bps.map(|b| b / 1_000_000.0)
    }
}

/// Structured result of one diagnostic run, one variant per kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Measurement {
    Latency(LatencyMeasurement),
    Route(RouteMeasurement),
    Combined(CombinedMeasurement),
    Throughput(ThroughputMeasurement),
}

impl Measurement {
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            Self::Latency(_) => DiagnosticKind::LatencyProbe,
            Self::Route(_) => DiagnosticKind::RouteTrace,
            Self::Combined(_) => DiagnosticKind::CombinedTrace,
            Self::Throughput(_) => DiagnosticKind::ThroughputTest,
        }
    }
}
