//! Number and unit normalization shared by the parsers.

use std::time::Duration;

/// Parse a non-negative number, accepting a decimal comma and a `<`/`>`
/// bound prefix (`<1` reads as 1).
pub fn number(token: &str) -> Option<f64> {
    let token = token.trim().trim_start_matches(['<', '>', '~', '=']);
    if token.is_empty() {
        return None;
    }
    let normalized = token.replace(',', ".");
    let value: f64 = normalized.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Split a token like `10.5ms` or `<1ms` into its number and unit
pub fn split_unit(token: &str) -> Option<(f64, &str)> {
    let token = token.trim();
    let end = token
        .char_indices()
        .find(|&(_, c)| !(c.is_ascii_digit() || matches!(c, '.' | ',' | '<' | '>' | '~')))
        .map_or(token.len(), |(i, _)| i);
    let value = number(&token[..end])?;
    Some((value, &token[end..]))
}

/// Duration multiplier to milliseconds for a time unit, if recognized
fn ms_per_unit(unit: &str) -> Option<f64> {
    match unit.trim().trim_end_matches(['.', ',', ';', ')']).to_lowercase().as_str() {
        "" | "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => Some(1.0),
        "s" | "sec" | "secs" | "second" | "seconds" => Some(1000.0),
        "us" | "µs" | "μs" | "usec" | "usecs" => Some(0.001),
        _ => None,
    }
}

/// Whether `unit` names a time unit (the empty unit excluded)
pub fn is_time_unit(unit: &str) -> bool {
    !unit.trim().is_empty() && ms_per_unit(unit).is_some()
}

/// Convert a value in `unit` to a Duration (bare numbers are milliseconds)
pub fn duration(value: f64, unit: &str) -> Option<Duration> {
    let nanos = (value * ms_per_unit(unit)? * 1_000_000.0).round();
    (nanos.is_finite() && nanos >= 0.0 && nanos < u64::MAX as f64)
        .then(|| Duration::from_nanos(nanos as u64))
}

/// Milliseconds as a Duration
pub fn millis(value: f64) -> Option<Duration> {
    duration(value, "ms")
}

/// Parse a token like `12.5ms`, or a number plus a separate unit token
pub fn duration_token(value: &str, unit: Option<&str>) -> Option<Duration> {
    let (v, attached) = split_unit(value)?;
    if attached.is_empty() {
        duration(v, unit.unwrap_or(""))
    } else {
        duration(v, attached)
    }
}

/// Convert a rate in `unit` to bits per second
pub fn rate_bps(value: f64, unit: &str) -> Option<f64> {
    let factor = match unit.trim().trim_end_matches(['.', ',']) {
        "bit/s" | "bps" | "b/s" => 1.0,
        "Kbit/s" | "kbit/s" | "Kbps" | "kbps" | "Kb/s" | "kb/s" => 1e3,
        "Mbit/s" | "mbit/s" | "Mbps" | "mbps" | "Mb/s" => 1e6,
        "Gbit/s" | "gbit/s" | "Gbps" | "gbps" | "Gb/s" => 1e9,
        "B/s" | "Bps" => 8.0,
        "kB/s" | "KB/s" | "kBps" | "KBps" => 8e3,
        "MB/s" | "MBps" => 8e6,
        "GB/s" | "GBps" => 8e9,
        _ => return None,
    };
    Some(value * factor)
}
