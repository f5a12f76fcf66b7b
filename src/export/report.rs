use std::io::Write;
use std::time::Duration;

use crate::state::{
    CombinedMeasurement, DiagnosticReport, IspVerdict, LatencyMeasurement, Measurement,
    RouteMeasurement, Status, TestRun, ThroughputMeasurement,
};

/// Generate a plain-text report: ISP verdict, per-target results, summary
pub fn generate_report<W: Write>(report: &DiagnosticReport, mut writer: W) -> std::io::Result<()> {
    writeln!(writer, "netdiag report")?;
    writeln!(
        writer,
        "Started: {}",
        report.started_at().format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(writer)?;

    write_isp(report.isp(), &mut writer)?;

    for target in report.targets() {
        writeln!(writer)?;
        writeln!(writer, "== {} ==", target.target)?;
        if target.runs.is_empty() {
            writeln!(writer, "  (no tests)")?;
        }
        for run in &target.runs {
            write_run(run, &mut writer)?;
        }
    }

    let summary = report.summary();
    writeln!(writer)?;
    writeln!(writer, "Summary")?;
    writeln!(writer, "{}", "-".repeat(40))?;
    writeln!(
        writer,
        "Tests:        {} ({} ok, {} degraded, {} failed)",
        summary.total, summary.ok, summary.degraded, summary.failed
    )?;
    writeln!(
        writer,
        "Success rate: {:.1}% ({})",
        summary.success_rate * 100.0,
        summary.grade
    )?;
    if let Some(latency) = summary.average_latency {
        writeln!(writer, "Avg latency:  {}", fmt_ms(latency))?;
    }
    if let Some(loss) = summary.average_loss {
        writeln!(writer, "Avg loss:     {:.1}%", loss * 100.0)?;
    }
    if let Some(elapsed) = summary.execution_time {
        writeln!(writer, "Duration:     {:.1}s", elapsed.as_secs_f64())?;
    }

    Ok(())
}

/// Generate report to string
pub fn generate_report_string(report: &DiagnosticReport) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail
    let _ = generate_report(report, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn write_isp<W: Write>(isp: &IspVerdict, writer: &mut W) -> std::io::Result<()> {
    writeln!(writer, "ISP")?;
    writeln!(writer, "{}", "-".repeat(40))?;
    writeln!(
        writer,
        "Provider:     {} (confidence {:.0}%)",
        isp.provider().unwrap_or("unknown"),
        isp.confidence() * 100.0
    )?;
    if let Some(ip) = isp.public_ip() {
        match isp.scope() {
            Some(scope) => writeln!(writer, "Public IP:    {} ({:?})", ip, scope)?,
            None => writeln!(writer, "Public IP:    {}", ip)?,
        }
    }
    if let Some(host) = isp.hostname() {
        writeln!(writer, "Hostname:     {}", host)?;
    }
    for signal in isp.signals() {
        writeln!(
            writer,
            "  [{}] {} <- {}",
            signal.source,
            signal.provider.as_deref().unwrap_or("-"),
            signal.evidence
        )?;
    }
    Ok(())
}

fn write_run<W: Write>(run: &TestRun, writer: &mut W) -> std::io::Result<()> {
    writeln!(writer, "-- {} [{}, attempts: {}]", run.kind, run.status, run.attempts)?;

    match &run.measurement {
        Some(Measurement::Latency(m)) => write_latency(m, writer),
        Some(Measurement::Route(m)) => write_route(m, writer),
        Some(Measurement::Combined(m)) => write_combined(m, writer),
        Some(Measurement::Throughput(m)) => write_throughput(m, writer),
        None => {
            if let Status::Failed(err) = &run.status {
                writeln!(writer, "   {}", err)?;
            }
            Ok(())
        }
    }
}

fn write_latency<W: Write>(m: &LatencyMeasurement, writer: &mut W) -> std::io::Result<()> {
    writeln!(
        writer,
        "   {} sent, {} received, {:.1}% loss ({})",
        m.sent(),
        m.received(),
        m.loss_ratio * 100.0,
        m.health()
    )?;
    if let Some(stats) = m.stats {
        writeln!(
            writer,
            "   min/avg/max/stddev = {}/{}/{}/{}",
            fmt_ms(stats.min),
            fmt_ms(stats.avg),
            fmt_ms(stats.max),
            fmt_ms(stats.stddev)
        )?;
    }
    Ok(())
}

fn write_route<W: Write>(m: &RouteMeasurement, writer: &mut W) -> std::io::Result<()> {
    writeln!(writer, "   {:>3}  {:<48} {:>10}", "#", "Host", "RTT")?;
    for hop in &m.hops {
        let host = host_label(hop.hostname.as_deref(), hop.address, "* * *");
        let rtt = hop.rtt.map(fmt_ms).unwrap_or_else(|| "-".into());
        writeln!(writer, "   {:>3}  {:<48} {:>10}", hop.index, host, rtt)?;
    }
    Ok(())
}

fn write_combined<W: Write>(m: &CombinedMeasurement, writer: &mut W) -> std::io::Result<()> {
    writeln!(
        writer,
        "   {:>3}  {:<40} {:>6} {:>5} {:>9} {:>9} {:>9} {:>9}",
        "#", "Host", "Loss%", "Snt", "Avg", "Best", "Wrst", "StDev"
    )?;
    for hop in &m.hops {
        let host = host_label(hop.hostname.as_deref(), hop.address, "???");
        let (avg, best, worst, stddev) = match hop.latency {
            Some(s) => (fmt_ms(s.avg), fmt_ms(s.min), fmt_ms(s.max), fmt_ms(s.stddev)),
            None => ("-".into(), "-".into(), "-".into(), "-".into()),
        };
        writeln!(
            writer,
            "   {:>3}  {:<40} {:>5.1}% {:>5} {:>9} {:>9} {:>9} {:>9}",
            hop.index,
            host,
            hop.loss_ratio * 100.0,
            hop.sent,
            avg,
            best,
            worst,
            stddev
        )?;
    }
    writeln!(
        writer,
        "   worst loss {:.1}%, path {}",
        m.worst_loss() * 100.0,
        m.health()
    )?;
    Ok(())
}

fn write_throughput<W: Write>(m: &ThroughputMeasurement, writer: &mut W) -> std::io::Result<()> {
    writeln!(writer, "   Download: {:.2} Mbit/s", m.download_mbps())?;
    match m.upload_mbps() {
        Some(up) => writeln!(writer, "   Upload:   {:.2} Mbit/s", up)?,
        None => writeln!(writer, "   Upload:   -")?,
    }
    if let Some(latency) = m.latency {
        writeln!(writer, "   Latency:  {}", fmt_ms(latency))?;
    }
    if let Some(name) = &m.server.name {
        match &m.server.location {
            Some(location) => writeln!(writer, "   Server:   {} ({})", name, location)?,
            None => writeln!(writer, "   Server:   {}", name)?,
        }
    }
    Ok(())
}

fn host_label(hostname: Option<&str>, address: Option<std::net::IpAddr>, silent: &str) -> String {
    match (hostname, address) {
        (Some(name), Some(ip)) => format!("{} ({})", name, ip),
        (Some(name), None) => name.to_string(),
        (None, Some(ip)) => ip.to_string(),
        (None, None) => silent.to_string(),
    }
}

fn fmt_ms(d: Duration) -> String {
    format!("{:.1}ms", d.as_secs_f64() * 1000.0)
}
