//! Entry point: validate, run the test units and the ISP detector
//! concurrently, then fold everything into a report.

use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::DiagnosticsConfig;
use crate::error::DiagError;
use crate::lookup::{DnsLookup, HttpLookupService, IpLookupService, IspDetector, ProviderCatalog, ReverseResolver};
use crate::probe::{ProcessRunner, SystemRunner};
use crate::state::{DiagnosticKind, DiagnosticReport, IspVerdict, Target, aggregate};
use crate::trace::{DiagnosticObserver, TestOrchestrator, TracingObserver};

/// Configured diagnostics run with injectable collaborators
///
/// Defaults: [`SystemRunner`], [`TracingObserver`], HTTP lookup services and
/// the system resolver built from the config when the run starts.
pub struct Diagnostics {
    config: Arc<DiagnosticsConfig>,
    runner: Arc<dyn ProcessRunner>,
    resolver: Option<Arc<dyn ReverseResolver>>,
    services: Option<Vec<Arc<dyn IpLookupService>>>,
    observer: Arc<dyn DiagnosticObserver>,
    cancel: CancellationToken,
}

impl Diagnostics {
    pub fn new(config: DiagnosticsConfig) -> Self {
        Self {
            config: Arc::new(config),
            runner: Arc::new(SystemRunner),
            resolver: None,
            services: None,
            observer: Arc::new(TracingObserver),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Reverse resolver used when `isp.reverse_dns` is enabled
    pub fn with_resolver(mut self, resolver: Arc<dyn ReverseResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Replace the services listed in `isp.lookup_services`
    pub fn with_lookup_services(mut self, services: Vec<Arc<dyn IpLookupService>>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DiagnosticObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Parent token; cancelling it stops the run and keeps finished results
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &DiagnosticsConfig {
        &self.config
    }

    /// Run every kind against every target.
    ///
    /// Fails only on configuration problems, before any work starts.
    pub async fn run<S: AsRef<str>>(
        &self,
        targets: &[S],
        kinds: &[DiagnosticKind],
    ) -> Result<DiagnosticReport, DiagError> {
        self.config.validate()?;
        if targets.is_empty() {
            return Err(DiagError::Configuration("no targets given".into()));
        }
        if kinds.is_empty() {
            return Err(DiagError::Configuration("no diagnostic kinds selected".into()));
        }

        let mut parsed: Vec<Target> = Vec::with_capacity(targets.len());
        for raw in targets {
            let target = Target::new(raw.as_ref())?;
            if parsed.contains(&target) {
                warn!(host = %target, "duplicate target, skipping");
                continue;
            }
            parsed.push(target);
        }

        let detector = self.detector()?;

        let cancel = self.cancel.child_token();
        let deadline = self.config.overall_deadline.map(|limit| {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        warn!(deadline_secs = limit.as_secs_f64(), "overall deadline reached, cancelling");
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        let started_at = Utc::now();
        info!(targets = parsed.len(), kinds = kinds.len(), "starting diagnostics");

        let orchestrator = TestOrchestrator::new(
            self.runner.clone(),
            self.config.clone(),
            self.observer.clone(),
            cancel.clone(),
        );
        let (runs, isp) = tokio::join!(orchestrator.run(&parsed, kinds), async {
            match &detector {
                Some(detector) => detector.detect(&cancel).await,
                None => IspVerdict::unknown(),
            }
        });

        if let Some(handle) = deadline {
            handle.abort();
        }

        let report = aggregate(&parsed, runs, isp, started_at, Utc::now());
        info!(
            ok = report.summary().ok,
            degraded = report.summary().degraded,
            failed = report.summary().failed,
            "diagnostics finished"
        );
        Ok(report)
    }

    /// ISP detector per config, or None when detection is disabled
    fn detector(&self) -> Result<Option<IspDetector>, DiagError> {
        let settings = &self.config.isp;
        if !settings.enabled {
            return Ok(None);
        }

        let catalog = ProviderCatalog::from_settings(settings)?;
        let services = match &self.services {
            Some(services) => services.clone(),
            None => settings
                .lookup_services
                .iter()
                .map(|url| {
                    HttpLookupService::new(url.as_str(), settings.lookup_timeout)
                        .map(|s| Arc::new(s) as Arc<dyn IpLookupService>)
                })
                .collect::<Result<_, _>>()?,
        };

        let mut detector = IspDetector::new(catalog, services, self.observer.clone())
            .with_lookup_timeout(settings.lookup_timeout);
        if settings.reverse_dns {
            let resolver = match &self.resolver {
                Some(resolver) => resolver.clone(),
                None => Arc::new(DnsLookup::new()),
            };
            detector = detector.with_resolver(resolver);
        }
        Ok(Some(detector))
    }
}

/// Run diagnostics with the production runner, resolver and services
pub async fn run_diagnostics<S: AsRef<str>>(
    targets: &[S],
    kinds: &[DiagnosticKind],
    config: &DiagnosticsConfig,
) -> Result<DiagnosticReport, DiagError> {
    Diagnostics::new(config.clone()).run(targets, kinds).await
}
