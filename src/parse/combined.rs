//! `mtr --report` output (`-w`, `-z` and `-b` variants).

use std::net::IpAddr;

use super::units;
use crate::state::{CombinedHop, CombinedMeasurement, LatencyStats};

/// Loss% Snt Last Avg Best Wrst StDev
const NUMERIC_COLUMNS: usize = 7;

/// Extract hops from an mtr report; None when no hop line was found
pub fn extract(stdout: &str) -> Option<CombinedMeasurement> {
    let mut hops: Vec<CombinedHop> = Vec::new();

    for line in stdout.lines() {
        let Some(hop) = parse_line(line) else {
            continue;
        };
        if hops.last().is_some_and(|h| hop.index <= h.index) {
            continue;
        }
        hops.push(hop);
    }

    (!hops.is_empty()).then_some(CombinedMeasurement { hops })
}

fn parse_line(line: &str) -> Option<CombinedHop> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 1 + NUMERIC_COLUMNS {
        return None;
    }

    let index = hop_index(tokens[0])?;
    let (middle, columns) = tokens[1..].split_at(tokens.len() - 1 - NUMERIC_COLUMNS);

    let loss_pct = units::number(columns[0].trim_end_matches('%'))?;
    let sent: u32 = columns[1].parse().ok()?;
    let mut figures = [0.0; 5];
    for (slot, token) in figures.iter_mut().zip(&columns[2..]) {
        *slot = units::number(token)?;
    }
    let [last, avg, best, worst, stddev] = figures;

    let (asn, host) = match middle.split_first() {
        Some((first, rest)) if first.starts_with("AS") => {
            let asn = first.trim_start_matches("AS");
            let asn = (!asn.is_empty() && asn.chars().all(|c| c.is_ascii_digit()))
                .then(|| format!("AS{}", asn));
            (asn, rest)
        }
        _ => (None, middle),
    };
    let (hostname, address) = parse_host(host);

    let loss_ratio = (loss_pct / 100.0).clamp(0.0, 1.0);
    let answered = loss_ratio < 1.0;
    let latency = answered
        .then(|| {
            Some(LatencyStats {
                min: units::millis(best)?,
                avg: units::millis(avg)?,
                max: units::millis(worst)?,
                stddev: units::millis(stddev)?,
            })
        })
        .flatten();

    Some(CombinedHop {
        index,
        address,
        hostname,
        asn,
        sent,
        loss_ratio,
        last: answered.then(|| units::millis(last)).flatten(),
        latency,
    })
}

/// `3.` or `3.|--`
fn hop_index(token: &str) -> Option<u8> {
    let token = token.strip_suffix("|--").unwrap_or(token);
    let index: u8 = token.strip_suffix('.')?.parse().ok()?;
    (index > 0).then_some(index)
}

/// `???`, `name (ip)`, `ip` or `name`
fn parse_host(tokens: &[&str]) -> (Option<String>, Option<IpAddr>) {
    let tokens: Vec<&str> = tokens.iter().copied().filter(|t| *t != "???").collect();

    let address = tokens.iter().find_map(|t| {
        let inner = t.strip_prefix('(').and_then(|t| t.strip_suffix(')')).unwrap_or(t);
        inner.parse::<IpAddr>().ok()
    });

    let hostname = tokens
        .iter()
        .find(|t| !t.starts_with('(') && t.parse::<IpAddr>().is_err())
        .map(|t| crate::lookup::sanitize_display(t));

    (hostname, address)
}
