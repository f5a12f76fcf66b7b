//! Final report: a pure fold of finalized runs and the ISP verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::{IspVerdict, Measurement, Status, Target, TestRun, option_duration_ms};

/// All runs for one target, ordered by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: Target,
    pub runs: Vec<TestRun>,
}

/// Overall grade on the fraction of usable runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Grade {
    pub fn from_success_rate(rate: f64) -> Self {
        if rate >= 0.9 {
            Self::Excellent
        } else if rate >= 0.7 {
            Self::Good
        } else if rate >= 0.5 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        };
        f.write_str(s)
    }
}

/// Headline figures derived from every run in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub ok: usize,
    pub degraded: usize,
    pub failed: usize,
    /// (ok + degraded) / total; 0 for an empty report
    pub success_rate: f64,
    /// Mean average RTT over usable latency probes
    #[serde(with = "option_duration_ms")]
    pub average_latency: Option<Duration>,
    /// Mean loss ratio over usable latency probes
    pub average_loss: Option<f64>,
    #[serde(with = "option_duration_ms")]
    pub execution_time: Option<Duration>,
    pub grade: Grade,
}

impl ReportSummary {
    fn from_runs<'a>(
        runs: impl Iterator<Item = &'a TestRun>,
        execution_time: Option<Duration>,
    ) -> Self {
        let mut total = 0;
        let mut ok = 0;
        let mut degraded = 0;
        let mut latencies = Vec::new();
        let mut losses = Vec::new();

        for run in runs {
            total += 1;
            match run.status {
                Status::Ok => ok += 1,
                Status::Degraded(_) => degraded += 1,
                Status::Failed(_) => continue,
            }
            if let Some(Measurement::Latency(m)) = &run.measurement {
                losses.push(m.loss_ratio);
                if let Some(stats) = m.stats {
                    latencies.push(stats.avg);
                }
            }
        }

        let success_rate = if total == 0 {
            0.0
        } else {
            (ok + degraded) as f64 / total as f64
        };
        let average_latency = (!latencies.is_empty())
            .then(|| latencies.iter().sum::<Duration>() / latencies.len() as u32);
        let average_loss =
            (!losses.is_empty()).then(|| losses.iter().sum::<f64>() / losses.len() as f64);

        Self {
            total,
            ok,
            degraded,
            failed: total - ok - degraded,
            success_rate,
            average_latency,
            average_loss,
            execution_time,
            grade: Grade::from_success_rate(success_rate),
        }
    }
}

/// Immutable result of one diagnostics invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    started_at: DateTime<Utc>,
    generated_at: DateTime<Utc>,
    targets: Vec<TargetReport>,
    isp: IspVerdict,
    summary: ReportSummary,
}

impl DiagnosticReport {
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn targets(&self) -> &[TargetReport] {
        &self.targets
    }

    pub fn isp(&self) -> &IspVerdict {
        &self.isp
    }

    pub fn summary(&self) -> &ReportSummary {
        &self.summary
    }

    /// Every run across all targets, in report order
    pub fn runs(&self) -> impl Iterator<Item = &TestRun> {
        self.targets.iter().flat_map(|t| t.runs.iter())
    }

    pub fn target(&self, target: &Target) -> Option<&TargetReport> {
        self.targets.iter().find(|t| &t.target == target)
    }
}

/// Group runs by target in requested order and derive the summary.
///
/// Runs whose target is not in `targets` are dropped.
pub fn aggregate(
    targets: &[Target],
    runs: Vec<TestRun>,
    isp: IspVerdict,
    started_at: DateTime<Utc>,
    generated_at: DateTime<Utc>,
) -> DiagnosticReport {
    let mut grouped: Vec<TargetReport> = targets
        .iter()
        .map(|t| TargetReport {
            target: t.clone(),
            runs: Vec::new(),
        })
        .collect();

    for run in runs {
        if let Some(group) = grouped.iter_mut().find(|g| g.target == run.target) {
            group.runs.push(run);
        }
    }

    for group in &mut grouped {
        group.runs.sort_by_key(|r| r.kind);
    }

    let execution_time = (generated_at - started_at).to_std().ok();
    let summary = ReportSummary::from_runs(grouped.iter().flat_map(|g| g.runs.iter()), execution_time);

    DiagnosticReport {
        started_at,
        generated_at,
        targets: grouped,
        isp,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagError;
    use crate::state::{DiagnosticKind, LatencyMeasurement, Sample};

    fn run(target: &Target, kind: DiagnosticKind, status: Status) -> TestRun {
        TestRun {
            target: target.clone(),
            kind,
            measurement: None,
            status,
            raw: None,
            attempts: 1,
        }
    }

    #[test]
    fn test_aggregate_groups_and_orders() {
        let a = Target::new("a.example").unwrap();
        let b = Target::new("b.example").unwrap();
        let runs = vec![
            run(&b, DiagnosticKind::LatencyProbe, Status::Ok),
            run(&a, DiagnosticKind::CombinedTrace, Status::Ok),
            run(&a, DiagnosticKind::LatencyProbe, Status::Failed(DiagError::Cancelled)),
        ];
        let now = Utc::now();
        let report = aggregate(&[a.clone(), b.clone()], runs, IspVerdict::unknown(), now, now);

        assert_eq!(report.targets()[0].target, a);
        let kinds: Vec<_> = report.targets()[0].runs.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![DiagnosticKind::LatencyProbe, DiagnosticKind::CombinedTrace]);
        assert_eq!(report.targets()[1].runs.len(), 1);

        let summary = report.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.failed, 1);
        assert!((summary.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary.grade, Grade::Fair);
        assert_eq!(summary.execution_time, Some(Duration::ZERO));
    }

    #[test]
    fn test_summary_latency_figures() {
        let t = Target::new("8.8.8.8").unwrap();
        let mut r = run(&t, DiagnosticKind::LatencyProbe, Status::Ok);
        r.measurement = Some(Measurement::Latency(LatencyMeasurement::from_samples(vec![
            Sample::Reply(Duration::from_millis(20)),
            Sample::Lost,
        ])));
        let now = Utc::now();
        let report = aggregate(std::slice::from_ref(&t), vec![r], IspVerdict::unknown(), now, now);

        let summary = report.summary();
        assert_eq!(summary.average_latency, Some(Duration::from_millis(20)));
        assert_eq!(summary.average_loss, Some(0.5));
        assert_eq!(summary.grade, Grade::Excellent);
    }

    #[test]
    fn test_empty_report() {
        let now = Utc::now();
        let report = aggregate(&[], vec![], IspVerdict::unknown(), now, now);
        assert_eq!(report.summary().total, 0);
        assert_eq!(report.summary().grade, Grade::Poor);
    }

    #[test]
    fn test_grade_thresholds() {
        assert_eq!(Grade::from_success_rate(0.9), Grade::Excellent);
        assert_eq!(Grade::from_success_rate(0.75), Grade::Good);
        assert_eq!(Grade::from_success_rate(0.5), Grade::Fair);
        assert_eq!(Grade::from_success_rate(0.1), Grade::Poor);
    }
}
