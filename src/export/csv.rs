use anyhow::Result;
use std::io::Write;
use std::time::Duration;

use crate::state::{DiagnosticReport, Measurement, TestRun};

const HEADER: &str = "target,kind,status,attempts,loss_pct,min_ms,avg_ms,max_ms,stddev_ms,hops,download_mbps,upload_mbps,error";

/// Export one row per test run
pub fn export_csv<W: Write>(report: &DiagnosticReport, mut writer: W) -> Result<()> {
    writeln!(writer, "{}", HEADER)?;

    for run in report.runs() {
        let figures = Figures::from_run(run);
        let error = match &run.status {
            crate::state::Status::Failed(err) => err.to_string(),
            _ => String::new(),
        };

        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{},{},{},{},{}",
            escape_csv(run.target.as_str()),
            run.kind,
            run.status.label(),
            run.attempts,
            figures.loss_pct,
            figures.min,
            figures.avg,
            figures.max,
            figures.stddev,
            figures.hops,
            figures.download,
            figures.upload,
            escape_csv(&error)
        )?;
    }

    Ok(())
}

/// Headline columns; empty when the measurement has no such figure
#[derive(Default)]
struct Figures {
    loss_pct: String,
    min: String,
    avg: String,
    max: String,
    stddev: String,
    hops: String,
    download: String,
    upload: String,
}

impl Figures {
    fn from_run(run: &TestRun) -> Self {
        let mut f = Self::default();
        match &run.measurement {
            Some(Measurement::Latency(m)) => {
                f.loss_pct = format!("{:.1}", m.loss_ratio * 100.0);
                if let Some(stats) = m.stats {
                    f.min = ms(stats.min);
                    f.avg = ms(stats.avg);
                    f.max = ms(stats.max);
                    f.stddev = ms(stats.stddev);
                }
            }
            Some(Measurement::Route(m)) => {
                f.hops = m.hops.len().to_string();
                if let Some(rtt) = m.last_responsive().and_then(|h| h.rtt) {
                    f.avg = ms(rtt);
                }
            }
            Some(Measurement::Combined(m)) => {
                f.hops = m.hops.len().to_string();
                f.loss_pct = format!("{:.1}", m.worst_loss() * 100.0);
                if let Some(avg) = m.average_latency() {
                    f.avg = ms(avg);
                }
            }
            Some(Measurement::Throughput(m)) => {
                f.download = format!("{:.2}", m.download_mbps());
                f.upload = m.upload_mbps().map(|u| format!("{:.2}", u)).unwrap_or_default();
                if let Some(latency) = m.latency {
                    f.avg = ms(latency);
                }
            }
            None => {}
        }
        f
    }
}

fn ms(d: Duration) -> String {
    format!("{:.2}", d.as_secs_f64() * 1000.0)
}

/// Escape a string for CSV (quote if contains comma, quote, or newline)
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
