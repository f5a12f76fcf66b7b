//! Throughput summaries: `speedtest-cli --json`, Ookla `speedtest -f json`,
//! and the human-readable text forms of both tools.

use serde_json::Value;
use std::time::Duration;

use super::units;
use crate::state::{ServerIdentity, ThroughputMeasurement};

/// Fields collected so far; later values overwrite earlier ones
#[derive(Debug, Default)]
struct Summary {
    download_bps: Option<f64>,
    upload_bps: Option<f64>,
    latency: Option<Duration>,
    server: ServerIdentity,
}

impl Summary {
    fn finish(self) -> Option<ThroughputMeasurement> {
        Some(ThroughputMeasurement {
            download_bps: self.download_bps?,
            upload_bps: self.upload_bps,
            latency: self.latency,
            server: self.server,
        })
    }
}

/// Extract the summary; None without a download figure
pub fn extract(stdout: &str) -> Option<ThroughputMeasurement> {
    let mut summary = Summary::default();

    // Pretty-printed JSON spans lines, so try the whole document first
    if let Ok(value) = serde_json::from_str::<Value>(stdout.trim()) {
        apply_json(&mut summary, &value);
        return summary.finish();
    }

    for line in stdout.lines() {
        let line = line.trim();
        if line.starts_with('{') {
            if let Ok(value) = serde_json::from_str::<Value>(line) {
                apply_json(&mut summary, &value);
            }
        } else {
            apply_text(&mut summary, line);
        }
    }

    summary.finish()
}

fn apply_json(summary: &mut Summary, value: &Value) {
    // Ookla JSON lines carry progress records; only the result has figures
    if value.get("type").and_then(Value::as_str).is_some_and(|t| t != "result") {
        return;
    }

    if let Some(bps) = json_rate(value.get("download")) {
        summary.download_bps = Some(bps);
    }
    if let Some(bps) = json_rate(value.get("upload")) {
        summary.upload_bps = Some(bps);
    }

    let ping = value.get("ping");
    let latency_ms = ping
        .and_then(Value::as_f64)
        .or_else(|| ping.and_then(|p| p.get("latency")).and_then(Value::as_f64));
    if let Some(rtt) = latency_ms.filter(|ms| *ms > 0.0).and_then(units::millis) {
        summary.latency = Some(rtt);
    }

    if let Some(server) = value.get("server") {
        let text = |key: &str| match server.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => {
                Some(crate::lookup::sanitize_display(s.trim()))
            }
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        summary.server = ServerIdentity {
            name: text("name").or_else(|| text("sponsor")),
            location: text("location").or_else(|| text("country")),
            id: text("id"),
        };
    }
}

/// `speedtest-cli` reports bits/s as a number; Ookla reports bytes/s in
/// `{"bandwidth": ...}`. Zero means the phase was skipped.
fn json_rate(value: Option<&Value>) -> Option<f64> {
    let value = value?;
    let bps = value
        .as_f64()
        .or_else(|| value.get("bandwidth").and_then(Value::as_f64).map(|b| b * 8.0))?;
    (bps.is_finite() && bps > 0.0).then_some(bps)
}

fn apply_text(summary: &mut Summary, line: &str) {
    let Some((key, rest)) = line.split_once(':') else {
        return;
    };
    let key = key.trim().to_lowercase();
    let rest = rest.trim();

    match key.as_str() {
        "download" => {
            if let Some(bps) = text_rate(rest) {
                summary.download_bps = Some(bps);
            }
        }
        "upload" => {
            if let Some(bps) = text_rate(rest) {
                summary.upload_bps = Some(bps);
            }
        }
        "ping" | "latency" | "idle latency" => {
            if let Some(rtt) = text_duration(rest) {
                summary.latency = Some(rtt);
            }
        }
        "server" => summary.server = ookla_server(rest),
        _ if key.starts_with("hosted by ") => {
            // Hosted by Vivo (São Paulo) [3.21 km]: 15.2 ms
            let host = line["hosted by ".len()..]
                .split_once(':')
                .map_or("", |(h, _)| h)
                .trim();
            let (name, location) = match host.split_once(" (") {
                Some((name, tail)) => (name, tail.split_once(')').map(|(loc, _)| loc)),
                None => (host, None),
            };
            summary.server.name = non_empty(name);
            summary.server.location = location.and_then(non_empty);
            if let Some(rtt) = text_duration(rest) {
                summary.latency = Some(rtt);
            }
        }
        _ => {}
    }
}

/// `93.12 Mbit/s` or `93.12 Mbps (data used: ...)`
fn text_rate(rest: &str) -> Option<f64> {
    let mut tokens = rest.split_whitespace();
    let value = units::number(tokens.next()?)?;
    let bps = units::rate_bps(value, tokens.next()?)?;
    (bps > 0.0).then_some(bps)
}

/// `15.2 ms` or `15.2ms (0.3 ms jitter)`
fn text_duration(rest: &str) -> Option<Duration> {
    let mut tokens = rest.split_whitespace();
    let value = tokens.next()?;
    let unit = tokens.next().filter(|u| units::is_time_unit(u));
    units::duration_token(value, unit).filter(|d| !d.is_zero())
}

/// `Vivo - Sao Paulo (id: 1234)` / `Vivo - Sao Paulo (id = 1234)`
fn ookla_server(rest: &str) -> ServerIdentity {
    let (label, id) = match rest.split_once("(id") {
        Some((label, tail)) => {
            let id: String = tail
                .trim_start_matches([':', '=', ' '])
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            (label.trim(), non_empty(&id))
        }
        None => (rest.trim(), None),
    };
    let (name, location) = match label.split_once(" - ") {
        Some((name, location)) => (non_empty(name), non_empty(location)),
        None => (non_empty(label), None),
    };
    ServerIdentity { name, location, id }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| crate::lookup::sanitize_display(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speedtest_cli_json() {
        let out = r#"{"download": 93123456.5, "upload": 12345678.0, "ping": 15.2,
            "server": {"name": "Sao Paulo", "country": "Brazil", "sponsor": "Vivo", "id": "1234"},
            "timestamp": "2024-03-01T10:00:00Z"}"#;
        let m = extract(out).unwrap();
        assert_eq!(m.download_bps, 93123456.5);
        assert_eq!(m.upload_bps, Some(12345678.0));
        assert_eq!(m.latency, Some(Duration::from_micros(15200)));
        assert_eq!(m.server.name.as_deref(), Some("Sao Paulo"));
        assert_eq!(m.server.location.as_deref(), Some("Brazil"));
        assert_eq!(m.server.id.as_deref(), Some("1234"));
    }

    #[test]
    fn test_ookla_json_bytes() {
        let out = r#"{"type":"result","ping":{"jitter":0.3,"latency":9.5},
            "download":{"bandwidth":12500000,"bytes":1},"upload":{"bandwidth":2500000,"bytes":1},
            "server":{"id":4321,"name":"Claro","location":"Rio de Janeiro"}}"#;
        let m = extract(out).unwrap();
        assert_eq!(m.download_bps, 100_000_000.0);
        assert_eq!(m.upload_bps, Some(20_000_000.0));
        assert_eq!(m.latency, Some(Duration::from_micros(9500)));
        assert_eq!(m.server.id.as_deref(), Some("4321"));
        assert_eq!(m.server.location.as_deref(), Some("Rio de Janeiro"));
    }

    #[test]
    fn test_ookla_json_lines_skip_progress() {
        let out = "\
{\"type\":\"testStart\",\"server\":{\"name\":\"X\"}}
{\"type\":\"download\",\"download\":{\"bandwidth\":1}}
{\"type\":\"result\",\"download\":{\"bandwidth\":1000000},\"ping\":{\"latency\":5.0}}
";
        let m = extract(out).unwrap();
        assert_eq!(m.download_bps, 8_000_000.0);
        assert!(m.upload_bps.is_none());
    }

    #[test]
    fn test_speedtest_cli_text() {
        let out = "\
Retrieving speedtest.net configuration...
Testing from Vivo (200.142.10.1)...
Hosted by Vivo (São Paulo) [3.21 km]: 15.2 ms
Testing download speed................
Download: 93.12 Mbit/s
Testing upload speed......
Upload: 12.50 Mbit/s
";
        let m = extract(out).unwrap();
        assert!((m.download_mbps() - 93.12).abs() < 1e-9);
        assert_eq!(m.upload_mbps(), Some(12.5));
        assert_eq!(m.latency, Some(Duration::from_micros(15200)));
        assert_eq!(m.server.name.as_deref(), Some("Vivo"));
        assert_eq!(m.server.location.as_deref(), Some("São Paulo"));
    }

    #[test]
    fn test_ookla_text() {
        let out = "\
     Server: Claro - Rio de Janeiro (id: 4321)
        ISP: Claro
Idle Latency:     9.50 ms   (jitter: 0.30ms, low: 9.10ms, high: 9.90ms)
   Download:   250.00 Mbps (data used: 300.0 MB)
     Upload:    50.00 Mbps (data used: 60.0 MB)
";
        let m = extract(out).unwrap();
        assert_eq!(m.download_bps, 250_000_000.0);
        assert_eq!(m.upload_bps, Some(50_000_000.0));
        assert_eq!(m.latency, Some(Duration::from_micros(9500)));
        assert_eq!(m.server.name.as_deref(), Some("Claro"));
        assert_eq!(m.server.location.as_deref(), Some("Rio de Janeiro"));
        assert_eq!(m.server.id.as_deref(), Some("4321"));
    }

    #[test]
    fn test_interrupted_before_upload() {
        let out = "Ping: 20.1 ms\nDownload: 50.00 Mbit/s\nTesting upload speed...\n";
        let m = extract(out).unwrap();
        assert!(m.upload_bps.is_none());
        assert_eq!(m.latency, Some(Duration::from_micros(20100)));
    }

    #[test]
    fn test_no_download_is_no_summary() {
        assert!(extract("Retrieving speedtest.net configuration...\n").is_none());
        assert!(extract("Ping: 20.1 ms\n").is_none());
        assert!(extract(r#"{"download": 0, "upload": 0, "ping": 0}"#).is_none());
        assert!(extract("").is_none());
    }
}
