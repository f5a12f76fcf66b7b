//! `ping` output: Linux iputils, BSD/macOS and Windows, in several locales.

use super::units;
use crate::state::{LatencyMeasurement, Sample};

/// Keys introducing a round-trip time in reply lines
const RTT_KEYS: [&str; 5] = ["time", "tempo", "zeit", "temps", "tiempo"];

/// Markers of a probe that got no reply (matched lowercase)
const LOSS_MARKERS: [&str; 10] = [
    "request timed out",
    "request timeout for icmp_seq",
    "no answer yet for icmp_seq",
    "destination host unreachable",
    "destination net unreachable",
    "esgotado o tempo limite do pedido",
    "host de destino inacessível",
    "zeitüberschreitung der anforderung",
    "zielhost nicht erreichbar",
    "tiempo de espera agotado",
];

/// Largest summary probe count trusted for padding
const MAX_SUMMARY_PROBES: usize = u16::MAX as usize;

/// Extract samples from ping output; None when nothing usable was found
pub fn extract(stdout: &str) -> Option<LatencyMeasurement> {
    let mut samples = Vec::new();
    let mut transmitted = None;

    for line in stdout.lines() {
        let lower = line.to_lowercase();

        if lower.contains("(dup!)") {
            continue;
        }

        if let Some(rtt) = reply_rtt(&lower) {
            samples.push(Sample::Reply(rtt));
        } else if LOSS_MARKERS.iter().any(|m| lower.contains(m)) {
            samples.push(Sample::Lost);
        } else if let Some(n) = transmit_count(&lower) {
            transmitted = Some(n);
        }
    }

    // Probes the summary counted but no line reported
    if let Some(sent) = transmitted
        && sent > samples.len()
        && sent <= MAX_SUMMARY_PROBES
    {
        samples.resize(sent, Sample::Lost);
    }

    if samples.is_empty() {
        return None;
    }
    Some(LatencyMeasurement::from_samples(samples))
}

/// RTT from a reply line such as `... time=10.2 ms` or `... tempo<1ms ...`
fn reply_rtt(lower: &str) -> Option<std::time::Duration> {
    let mut tokens = lower.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        let Some((key, value)) = token.split_once(['=', '<']) else {
            continue;
        };
        if !RTT_KEYS.contains(&key) {
            continue;
        }
        // keep the bound marker so `time<1ms` reads as 1ms
        let value = if token.as_bytes().get(key.len()) == Some(&b'<') {
            format!("<{}", value)
        } else {
            value.to_string()
        };
        let unit = tokens.peek().copied().filter(|u| units::is_time_unit(u));
        if let Some(rtt) = units::duration_token(&value, unit) {
            return Some(rtt);
        }
    }
    None
}

/// Probe count from a transmit summary line
fn transmit_count(lower: &str) -> Option<usize> {
    let tokens: Vec<&str> = lower.split_whitespace().collect();

    // "4 packets transmitted, ..." / "4 pacotes transmitidos, ..."
    for pair in tokens.windows(3) {
        if matches!(pair[1], "packets" | "pacotes")
            && pair[2].starts_with("transmit")
        {
            return pair[0].parse().ok();
        }
    }

    // "Packets: Sent = 4, ..." / "Pacotes: Enviados = 4, ..." / "Pakete: Gesendet = 4, ..."
    for triple in tokens.windows(3) {
        if matches!(triple[0], "sent" | "enviados" | "gesendet") && triple[1] == "=" {
            return triple[2].trim_end_matches(',').parse().ok();
        }
    }

    None
}
