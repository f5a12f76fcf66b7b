use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DiagnosticsConfig;
use crate::parse;
use crate::probe::{self, ProcessRunner};
use crate::state::{DiagnosticKind, Target, TestRun};
use crate::trace::observer::DiagnosticObserver;
use crate::trace::unit::UnitState;

/// Runs every (target, kind) unit on a bounded pool with per-unit retries
pub struct TestOrchestrator {
    runner: Arc<dyn ProcessRunner>,
    config: Arc<DiagnosticsConfig>,
    observer: Arc<dyn DiagnosticObserver>,
    cancel: CancellationToken,
}

impl TestOrchestrator {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        config: Arc<DiagnosticsConfig>,
        observer: Arc<dyn DiagnosticObserver>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            runner,
            config,
            observer,
            cancel,
        }
    }

    /// Units to schedule, in report order.
    ///
    /// Throughput measures the local uplink rather than a path, so it runs
    /// once, attributed to the first target.
    pub fn units(targets: &[Target], kinds: &[DiagnosticKind]) -> Vec<(Target, DiagnosticKind)> {
        let mut kinds = kinds.to_vec();
        kinds.sort();
        kinds.dedup();

        let mut units = Vec::new();
        for (i, target) in targets.iter().enumerate() {
            for &kind in &kinds {
                if kind.is_target_scoped() || i == 0 {
                    units.push((target.clone(), kind));
                }
            }
        }
        units
    }

    /// Run all units; returns one finalized TestRun per unit, in no particular order
    pub async fn run(&self, targets: &[Target], kinds: &[DiagnosticKind]) -> Vec<TestRun> {
        let units = Self::units(targets, kinds);
        debug!(units = units.len(), workers = self.config.worker_pool_size, "scheduling tests");

        futures::stream::iter(units)
            .map(|(target, kind)| self.run_unit(target, kind))
            .buffer_unordered(self.config.worker_pool_size.max(1))
            .collect()
            .await
    }

    async fn run_unit(&self, target: Target, kind: DiagnosticKind) -> TestRun {
        let settings = self.config.kind(kind);
        let command = probe::build(kind, &target, settings);

        let mut state = UnitState::Pending.start();
        let mut last = None;

        while let UnitState::Running { attempt } = state {
            if self.cancel.is_cancelled() {
                state = state.abandon();
                break;
            }

            self.observer.unit_started(&target, kind, attempt);
            let raw = Arc::new(self.runner.run(&command, settings.timeout, &self.cancel).await);
            let outcome = parse::parse(kind, &raw);
            state = state.settle(&outcome.status, settings.max_attempts);

            let run = TestRun {
                target: target.clone(),
                kind,
                measurement: outcome.measurement,
                status: outcome.status,
                raw: Some(raw),
                attempts: attempt,
            };
            self.observer.unit_finished(&run);
            last = Some(run);

            if matches!(state, UnitState::Running { .. }) && !self.config.retry_delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.retry_delay) => {}
                    _ = self.cancel.cancelled() => {}
                }
            }
        }

        debug!(host = %target, %kind, ?state, "unit finalized");
        last.unwrap_or_else(|| TestRun::not_started(target, kind))
    }
}
