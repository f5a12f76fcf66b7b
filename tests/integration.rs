//! End-to-end tests for the diagnostics pipeline
//!
//! A scripted process runner stands in for ping/traceroute/mtr/speedtest and
//! stub services stand in for the network, so no test touches the OS or the
//! internet.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use netdiag::config::DiagnosticsConfig;
use netdiag::lookup::{IpLookupService, ReverseResolver, ServiceAnswer};
use netdiag::probe::ProcessRunner;
use netdiag::state::{
    CommandSpec, Completion, DegradedReason, DiagnosticKind, DiagnosticReport, IspSignal,
    Measurement, RawExecution, SignalSource, Status, Target, TestRun,
};
use netdiag::trace::DiagnosticObserver;
use netdiag::{DiagError, Diagnostics};

const PING_OK: &str = "\
PING 1.1.1.1 (1.1.1.1) 56(84) bytes of data.
64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=10.0 ms
64 bytes from 1.1.1.1: icmp_seq=2 ttl=57 time=12.0 ms
64 bytes from 1.1.1.1: icmp_seq=3 ttl=57 time=11.0 ms
64 bytes from 1.1.1.1: icmp_seq=4 ttl=57 time=13.0 ms

--- 1.1.1.1 ping statistics ---
4 packets transmitted, 4 received, 0% packet loss, time 3004ms
rtt min/avg/max/mdev = 10.000/11.500/13.000/1.118 ms
";

const PING_PARTIAL: &str = "\
PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.
64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=20.5 ms
";

const TRACEROUTE_OK: &str = "\
traceroute to 1.1.1.1 (1.1.1.1), 30 hops max, 60 byte packets
 1  192.168.0.1  1.123 ms  1.001 ms  0.980 ms
 2  * * *
 3  1.1.1.1  10.2 ms  10.1 ms  10.3 ms
";

const MTR_OK: &str = "\
Start: 2024-05-01T12:00:00+0000
HOST: box                         Loss%   Snt   Last   Avg  Best  Wrst StDev
  1.|-- 192.168.0.1                0.0%    10    1.0   1.1   0.9   1.5   0.2
  2.|-- ???                       100.0    10    0.0   0.0   0.0   0.0   0.0
  3.|-- 1.1.1.1                    0.0%    10   10.1  10.2  10.0  10.6   0.2
";

const SPEEDTEST_OK: &str = r#"{"download": 93100000.0, "upload": 11200000.0, "ping": 15.2, "server": {"name": "Sao Paulo", "sponsor": "Example Telecom", "country": "Brazil", "id": "1234"}}"#;

/// Canned output per program; records every invocation
struct ScriptedRunner {
    calls: Mutex<Vec<CommandSpec>>,
    script: fn(&CommandSpec) -> RawExecution,
}

impl ScriptedRunner {
    fn new(script: fn(&CommandSpec) -> RawExecution) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            script,
        })
    }

    fn calls_to(&self, program: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.program == program).count()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec, _timeout: Duration, _cancel: &CancellationToken) -> RawExecution {
        self.calls.lock().push(command.clone());
        (self.script)(command)
    }
}

/// Every tool succeeds with canned output
fn healthy(command: &CommandSpec) -> RawExecution {
    let stdout = match command.program.as_str() {
        "ping" => PING_OK,
        "traceroute" => TRACEROUTE_OK,
        "mtr" => MTR_OK,
        _ => SPEEDTEST_OK,
    };
    RawExecution::completed(command.clone(), 0, stdout)
}

/// Holds ping until the run is cancelled, then reports what it saw so far
struct BlockingRunner;

#[async_trait]
impl ProcessRunner for BlockingRunner {
    async fn run(&self, command: &CommandSpec, _timeout: Duration, cancel: &CancellationToken) -> RawExecution {
        cancel.cancelled().await;
        RawExecution::new(
            command.clone(),
            Completion::Killed,
            None,
            PING_PARTIAL,
            "",
            Duration::from_millis(50),
        )
    }
}

struct StubService(Option<&'static str>);

#[async_trait]
impl IpLookupService for StubService {
    fn name(&self) -> &str {
        "stub"
    }

    async fn lookup(&self) -> Result<ServiceAnswer, DiagError> {
        match self.0 {
            Some(ip) => Ok(ServiceAnswer {
                ip: ip.parse().unwrap(),
                provider: None,
                evidence: format!("stub:{}", ip),
            }),
            None => Err(DiagError::NetworkUnreachable("stub offline".into())),
        }
    }
}

struct StubResolver(Option<&'static str>);

#[async_trait]
impl ReverseResolver for StubResolver {
    async fn reverse(&self, _ip: IpAddr) -> Result<String, DiagError> {
        self.0
            .map(str::to_string)
            .ok_or_else(|| DiagError::DnsResolutionFailure("stub".into()))
    }
}

#[derive(Default)]
struct RecordingObserver {
    started: Mutex<Vec<(String, DiagnosticKind, u32)>>,
    finished: Mutex<usize>,
    signals: Mutex<Vec<IspSignal>>,
}

impl DiagnosticObserver for RecordingObserver {
    fn unit_started(&self, target: &Target, kind: DiagnosticKind, attempt: u32) {
        self.started.lock().push((target.to_string(), kind, attempt));
    }

    fn unit_finished(&self, _run: &TestRun) {
        *self.finished.lock() += 1;
    }

    fn signal_collected(&self, signal: &IspSignal) {
        self.signals.lock().push(signal.clone());
    }
}

fn config() -> DiagnosticsConfig {
    let mut config = DiagnosticsConfig::default();
    for kind in DiagnosticKind::ALL {
        config.kind_mut(kind).program = Some(default_program(kind).into());
    }
    config
        .isp
        .ranges
        .insert("ProviderX".into(), vec!["1.2.3.0/24".into()]);
    config
        .isp
        .hostnames
        .insert("ProviderX".into(), vec!["providerx.net".into()]);
    config
}

/// Pin program names so the script does not depend on the host platform
fn default_program(kind: DiagnosticKind) -> &'static str {
    match kind {
        DiagnosticKind::LatencyProbe => "ping",
        DiagnosticKind::RouteTrace => "traceroute",
        DiagnosticKind::CombinedTrace => "mtr",
        DiagnosticKind::ThroughputTest => "speedtest-cli",
    }
}

fn services(ips: &[Option<&'static str>]) -> Vec<Arc<dyn IpLookupService>> {
    ips.iter()
        .map(|ip| Arc::new(StubService(*ip)) as Arc<dyn IpLookupService>)
        .collect()
}

fn diagnostics(runner: Arc<dyn ProcessRunner>, config: DiagnosticsConfig) -> Diagnostics {
    Diagnostics::new(config)
        .with_runner(runner)
        .with_lookup_services(services(&[Some("1.2.3.4"), Some("1.2.3.4"), Some("5.6.7.8")]))
        .with_resolver(Arc::new(StubResolver(Some("cpe-1-2-3-4.providerx.net"))))
}

fn run_for<'a>(report: &'a DiagnosticReport, host: &str, kind: DiagnosticKind) -> &'a TestRun {
    report
        .runs()
        .find(|r| r.target.as_str() == host && r.kind == kind)
        .unwrap()
}

#[tokio::test]
async fn test_latency_probe_scenario() {
    let runner = ScriptedRunner::new(healthy);
    let report = diagnostics(runner, config())
        .run(&["1.1.1.1"], &[DiagnosticKind::LatencyProbe])
        .await
        .unwrap();

    let run = run_for(&report, "1.1.1.1", DiagnosticKind::LatencyProbe);
    assert_eq!(run.status, Status::Ok);
    assert_eq!(run.attempts, 1);
    let Some(Measurement::Latency(m)) = &run.measurement else {
        panic!("expected latency measurement");
    };
    let stats = m.stats.unwrap();
    assert_eq!(stats.min, Duration::from_millis(10));
    assert_eq!(stats.max, Duration::from_millis(13));
    assert_eq!(stats.avg, Duration::from_micros(11_500));
    assert_eq!(m.loss_ratio, 0.0);
}

#[tokio::test]
async fn test_isp_majority_scenario() {
    let runner = ScriptedRunner::new(healthy);
    let observer = Arc::new(RecordingObserver::default());
    let report = diagnostics(runner, config())
        .with_observer(observer.clone())
        .run(&["1.1.1.1"], &[DiagnosticKind::LatencyProbe])
        .await
        .unwrap();

    let isp = report.isp();
    assert_eq!(isp.provider(), Some("ProviderX"));
    assert_eq!(isp.confidence(), 1.0);
    assert_eq!(isp.public_ip(), Some("1.2.3.4".parse().unwrap()));
    assert!(isp.is_reliable(0.5));

    let sources: Vec<SignalSource> = isp.signals().iter().map(|s| s.source).collect();
    assert_eq!(sources, vec![SignalSource::IpRangeTable, SignalSource::ReverseDns]);
    assert_eq!(observer.signals.lock().len(), 2);
}

#[tokio::test]
async fn test_isp_unknown_when_every_source_fails() {
    let runner = ScriptedRunner::new(healthy);
    let report = Diagnostics::new(config())
        .with_runner(runner)
        .with_lookup_services(services(&[None, None, None]))
        .with_resolver(Arc::new(StubResolver(None)))
        .run(&["1.1.1.1"], &[DiagnosticKind::LatencyProbe])
        .await
        .unwrap();

    assert_eq!(report.isp().provider(), None);
    assert_eq!(report.isp().confidence(), 0.0);
    assert!(report.isp().signals().is_empty());
    // tests are unaffected
    assert_eq!(report.summary().ok, 1);
}

#[tokio::test]
async fn test_missing_route_program_scenario() {
    fn script(command: &CommandSpec) -> RawExecution {
        if command.program == "traceroute" {
            RawExecution::program_not_found(command.clone())
        } else {
            healthy(command)
        }
    }
    let runner = ScriptedRunner::new(script);
    let mut config = config();
    config.retry_delay = Duration::from_secs(3600);
    config.traceroute.max_attempts = 1;

    let report = diagnostics(runner.clone(), config)
        .run(
            &["1.1.1.1", "8.8.8.8"],
            &[DiagnosticKind::LatencyProbe, DiagnosticKind::RouteTrace],
        )
        .await
        .unwrap();

    for host in ["1.1.1.1", "8.8.8.8"] {
        let trace = run_for(&report, host, DiagnosticKind::RouteTrace);
        assert_eq!(
            trace.status,
            Status::Failed(DiagError::ProgramNotFound {
                program: "traceroute".into()
            })
        );
        assert_eq!(trace.attempts, 1);
        assert!(trace.measurement.is_none());
        assert_eq!(run_for(&report, host, DiagnosticKind::LatencyProbe).status, Status::Ok);
    }
    assert_eq!(runner.calls_to("traceroute"), 2);
    assert_eq!(report.summary().failed, 2);
    assert_eq!(report.summary().ok, 2);
}

#[tokio::test]
async fn test_missing_program_retried_up_to_max_attempts() {
    fn script(command: &CommandSpec) -> RawExecution {
        if command.program == "mtr" {
            RawExecution::program_not_found(command.clone())
        } else {
            healthy(command)
        }
    }
    let runner = ScriptedRunner::new(script);
    let observer = Arc::new(RecordingObserver::default());
    let mut config = config();
    config.mtr.max_attempts = 3;

    let report = diagnostics(runner.clone(), config)
        .with_observer(observer.clone())
        .run(&["1.1.1.1"], &[DiagnosticKind::CombinedTrace])
        .await
        .unwrap();

    let run = run_for(&report, "1.1.1.1", DiagnosticKind::CombinedTrace);
    assert_eq!(run.attempts, 3);
    assert!(run.status.is_failed());
    assert_eq!(runner.calls_to("mtr"), 3);

    let attempts: Vec<u32> = observer.started.lock().iter().map(|(_, _, a)| *a).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert_eq!(*observer.finished.lock(), 3);
}

#[tokio::test]
async fn test_full_battery() {
    let runner = ScriptedRunner::new(healthy);
    let report = diagnostics(runner.clone(), config())
        .run(&["1.1.1.1", "8.8.8.8", "1.1.1.1"], &DiagnosticKind::ALL)
        .await
        .unwrap();

    // duplicate target skipped, throughput only on the first target
    assert_eq!(report.targets().len(), 2);
    assert_eq!(report.targets()[0].runs.len(), 4);
    assert_eq!(report.targets()[1].runs.len(), 3);
    assert_eq!(runner.calls_to("speedtest-cli"), 1);

    let kinds: Vec<DiagnosticKind> = report.targets()[0].runs.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, DiagnosticKind::ALL.to_vec());

    let Some(Measurement::Route(route)) = &run_for(&report, "8.8.8.8", DiagnosticKind::RouteTrace).measurement
    else {
        panic!("expected route measurement");
    };
    let indices: Vec<u8> = route.hops.iter().map(|h| h.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert!(!route.hops[1].is_responsive());

    let Some(Measurement::Combined(mtr)) = &run_for(&report, "1.1.1.1", DiagnosticKind::CombinedTrace).measurement
    else {
        panic!("expected mtr measurement");
    };
    assert_eq!(mtr.hops.len(), 3);
    assert!(mtr.hops[1].latency.is_none());

    let Some(Measurement::Throughput(speed)) =
        &run_for(&report, "1.1.1.1", DiagnosticKind::ThroughputTest).measurement
    else {
        panic!("expected throughput measurement");
    };
    assert!((speed.download_mbps() - 93.1).abs() < 1e-6);
    assert_eq!(speed.server.id.as_deref(), Some("1234"));

    let summary = report.summary();
    assert_eq!(summary.total, 7);
    assert_eq!(summary.ok, 7);
    assert_eq!(summary.success_rate, 1.0);
    assert_eq!(summary.average_latency, Some(Duration::from_micros(11_500)));
}

#[tokio::test]
async fn test_reports_are_deterministic() {
    let first = diagnostics(ScriptedRunner::new(healthy), config())
        .run(&["8.8.8.8", "1.1.1.1"], &DiagnosticKind::ALL)
        .await
        .unwrap();
    let second = diagnostics(ScriptedRunner::new(healthy), config())
        .run(&["8.8.8.8", "1.1.1.1"], &DiagnosticKind::ALL)
        .await
        .unwrap();

    assert_eq!(first.targets(), second.targets());
    assert_eq!(first.isp(), second.isp());
    assert_eq!(first.summary().ok, second.summary().ok);
    let order: Vec<&str> = first.targets().iter().map(|t| t.target.as_str()).collect();
    assert_eq!(order, vec!["8.8.8.8", "1.1.1.1"]);
}

#[tokio::test]
async fn test_timed_out_probe_keeps_partial_output() {
    fn script(command: &CommandSpec) -> RawExecution {
        RawExecution::new(
            command.clone(),
            Completion::TimedOut,
            None,
            PING_PARTIAL,
            "",
            Duration::from_secs(10),
        )
    }
    let runner = ScriptedRunner::new(script);
    let report = diagnostics(runner.clone(), config())
        .run(&["8.8.8.8"], &[DiagnosticKind::LatencyProbe])
        .await
        .unwrap();

    let run = run_for(&report, "8.8.8.8", DiagnosticKind::LatencyProbe);
    assert_eq!(run.status, Status::Degraded(DegradedReason::PartialData));
    assert_eq!(run.attempts, 1);
    let Some(Measurement::Latency(m)) = &run.measurement else {
        panic!("expected latency measurement");
    };
    assert_eq!(m.received(), 1);
    assert_eq!(runner.calls_to("ping"), 1);
}

#[tokio::test]
async fn test_cancellation_keeps_finished_results() {
    let cancel = CancellationToken::new();
    let mut config = config();
    config.worker_pool_size = 1;
    config.isp.enabled = false;

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = Diagnostics::new(config)
        .with_runner(Arc::new(BlockingRunner))
        .with_cancel(cancel)
        .run(&["8.8.8.8", "1.1.1.1"], &[DiagnosticKind::LatencyProbe])
        .await
        .unwrap();

    let first = run_for(&report, "8.8.8.8", DiagnosticKind::LatencyProbe);
    assert_eq!(first.status, Status::Degraded(DegradedReason::PartialData));
    assert_eq!(first.attempts, 1);

    let second = run_for(&report, "1.1.1.1", DiagnosticKind::LatencyProbe);
    assert_eq!(second.status, Status::Failed(DiagError::Cancelled));
    assert_eq!(second.attempts, 0);
    assert_eq!(report.summary().total, 2);
}

#[tokio::test]
async fn test_overall_deadline_cancels_run() {
    let mut config = config();
    config.overall_deadline = Some(Duration::from_millis(50));
    config.isp.enabled = false;

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        Diagnostics::new(config)
            .with_runner(Arc::new(BlockingRunner))
            .run(&["8.8.8.8"], &[DiagnosticKind::LatencyProbe]),
    )
    .await
    .expect("deadline should stop the run")
    .unwrap();

    let run = run_for(&report, "8.8.8.8", DiagnosticKind::LatencyProbe);
    assert_eq!(run.status, Status::Degraded(DegradedReason::PartialData));
    assert_eq!(report.isp().confidence(), 0.0);
}

#[tokio::test]
async fn test_configuration_errors_precede_work() {
    let runner = ScriptedRunner::new(healthy);
    let empty: [&str; 0] = [];
    let err = diagnostics(runner.clone(), config())
        .run(&empty, &DiagnosticKind::ALL)
        .await
        .unwrap_err();
    assert!(matches!(err, DiagError::Configuration(_)));

    let mut bad = config();
    bad.ping.max_attempts = 0;
    let err = diagnostics(runner.clone(), bad)
        .run(&["1.1.1.1"], &DiagnosticKind::ALL)
        .await
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(runner.calls.lock().is_empty());
}
