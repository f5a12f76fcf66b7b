//! `traceroute` (Linux, BSD/macOS) and Windows `tracert` output.

use std::net::IpAddr;
use std::time::Duration;

use super::units;
use crate::state::{RouteHop, RouteMeasurement, Sample};

/// Extract hops from route trace output; None when no hop line was found
pub fn extract(stdout: &str) -> Option<RouteMeasurement> {
    let mut hops: Vec<RouteHop> = Vec::new();

    for line in stdout.lines() {
        let mut tokens = line.split_whitespace().peekable();
        let Some(first) = tokens.peek().copied() else {
            continue;
        };

        match first.parse::<u8>() {
            Ok(index) if index > 0 => {
                if hops.last().is_some_and(|h| index <= h.index) {
                    continue;
                }
                tokens.next();
                let mut hop = RouteHop {
                    index,
                    address: None,
                    hostname: None,
                    rtt: None,
                    samples: Vec::new(),
                };
                scan(&mut hop, tokens.collect());
                hop.rtt = mean_rtt(&hop.samples);
                hops.push(hop);
            }
            Ok(_) => continue,
            // Extra probes of the previous hop wrapped onto their own line
            Err(_) => {
                let Some(hop) = hops.last_mut() else {
                    continue;
                };
                let mut extra = hop.clone();
                extra.samples.clear();
                scan(&mut extra, line.split_whitespace().collect());
                if extra.samples.iter().any(|s| !s.is_lost()) {
                    hop.address = hop.address.or(extra.address);
                    hop.hostname = hop.hostname.take().or(extra.hostname);
                    hop.samples.extend(extra.samples);
                    hop.rtt = mean_rtt(&hop.samples);
                }
            }
        }
    }

    (!hops.is_empty()).then_some(RouteMeasurement { hops })
}

/// Walk the tokens after the hop index
fn scan(hop: &mut RouteHop, tokens: Vec<&str>) {
    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        let next = tokens.get(i + 1).copied();

        if token == "*" {
            hop.samples.push(Sample::Lost);
        } else if token.starts_with('!') {
            // !H, !N, !X ... annotations
        } else if let Some(ip) = bracketed_ip(token).or_else(|| token.parse().ok()) {
            if hop.address.is_none() {
                hop.address = Some(ip);
            }
        } else if let Some(rtt) = reply(token, next) {
            hop.samples.push(Sample::Reply(rtt.0));
            i += rtt.1;
        } else if next.and_then(bracketed_ip).is_some() && hop.hostname.is_none() {
            hop.hostname = Some(crate::lookup::sanitize_display(token));
        }
        i += 1;
    }
}

/// A reply token: `12.3ms`, or `12.3` / `<1` followed by `ms`.
/// Returns the RTT and how many extra tokens were consumed.
fn reply(token: &str, next: Option<&str>) -> Option<(Duration, usize)> {
    let (value, unit) = units::split_unit(token)?;
    if !unit.is_empty() {
        return units::is_time_unit(unit)
            .then(|| units::duration(value, unit))
            .flatten()
            .map(|d| (d, 0));
    }
    let unit = next.filter(|u| units::is_time_unit(u))?;
    units::duration(value, unit).map(|d| (d, 1))
}

/// `(1.2.3.4)` or `[1.2.3.4]`
fn bracketed_ip(token: &str) -> Option<IpAddr> {
    let token = token.trim_end_matches([',', ':']);
    let inner = token
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .or_else(|| token.strip_prefix('[').and_then(|t| t.strip_suffix(']')))?;
    inner.parse().ok()
}

fn mean_rtt(samples: &[Sample]) -> Option<Duration> {
    let rtts: Vec<Duration> = samples.iter().filter_map(Sample::rtt).collect();
    if rtts.is_empty() {
        return None;
    }
    Some(rtts.iter().sum::<Duration>() / rtts.len() as u32)
}
