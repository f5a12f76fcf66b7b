use tracing::{debug, info, warn};

use crate::state::{DiagnosticKind, IspSignal, Status, Target, TestRun};

/// Progress hooks invoked synchronously by the orchestrator and detector
///
/// All methods default to no-ops.
pub trait DiagnosticObserver: Send + Sync {
    fn unit_started(&self, _target: &Target, _kind: DiagnosticKind, _attempt: u32) {}

    fn unit_finished(&self, _run: &TestRun) {}

    fn signal_collected(&self, _signal: &IspSignal) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl DiagnosticObserver for NoopObserver {}

/// Observer emitting `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DiagnosticObserver for TracingObserver {
    fn unit_started(&self, target: &Target, kind: DiagnosticKind, attempt: u32) {
        debug!(host = %target, %kind, attempt, "test started");
    }

    fn unit_finished(&self, run: &TestRun) {
        let elapsed_ms = run.raw.as_ref().map(|r| r.duration.as_millis());
        match &run.status {
            Status::Ok => info!(host = %run.target, kind = %run.kind, attempt = run.attempts, ?elapsed_ms, "test ok"),
            Status::Degraded(reason) => warn!(
                host = %run.target,
                kind = %run.kind,
                attempt = run.attempts,
                %reason,
                "test degraded"
            ),
            Status::Failed(err) => warn!(
                host = %run.target,
                kind = %run.kind,
                attempt = run.attempts,
                error = %err,
                "test failed"
            ),
        }
    }

    fn signal_collected(&self, signal: &IspSignal) {
        debug!(
            source = %signal.source,
            provider = signal.provider.as_deref().unwrap_or("-"),
            evidence = %signal.evidence,
            "ISP signal"
        );
    }
}
