use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Where an ISP signal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    IpRangeTable,
    ReverseDns,
    ExternalLookupService,
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IpRangeTable => write!(f, "ip-range"),
            Self::ReverseDns => write!(f, "reverse-dns"),
            Self::ExternalLookupService => write!(f, "lookup-service"),
        }
    }
}

/// One piece of evidence about the upstream provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IspSignal {
    pub source: SignalSource,
    /// Provider this signal points at; None when the evidence names no one
    pub provider: Option<String>,
    /// Raw evidence (matched prefix, hostname, service URL)
    pub evidence: String,
}

impl IspSignal {
    pub fn new(source: SignalSource, provider: Option<String>, evidence: impl Into<String>) -> Self {
        Self {
            source,
            provider,
            evidence: evidence.into(),
        }
    }
}

/// Address scope of the detected public IP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpScope {
    /// RFC 1918 / unique local
    Private,
    /// Carrier-grade NAT (100.64.0.0/10)
    Shared,
    Loopback,
    Public,
}

impl IpScope {
    pub fn classify(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => {
                let [a, b, ..] = v4.octets();
                if v4.is_loopback() {
                    Self::Loopback
                } else if v4.is_private() || v4.is_link_local() {
                    Self::Private
                } else if a == 100 && (64..128).contains(&b) {
                    Self::Shared
                } else {
                    Self::Public
                }
            }
            IpAddr::V6(v6) => {
                let first = v6.segments()[0];
                if v6.is_loopback() {
                    Self::Loopback
                } else if (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80 {
                    Self::Private
                } else {
                    Self::Public
                }
            }
        }
    }
}

/// Fused provider classification
///
/// Built only by the detector's fusion step; fields are read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IspVerdict {
    provider: Option<String>,
    confidence: f64,
    signals: Vec<IspSignal>,
    public_ip: Option<IpAddr>,
    hostname: Option<String>,
    scope: Option<IpScope>,
}

impl IspVerdict {
    pub(crate) fn new(
        provider: Option<String>,
        confidence: f64,
        signals: Vec<IspSignal>,
        public_ip: Option<IpAddr>,
        hostname: Option<String>,
    ) -> Self {
        Self {
            provider,
            confidence: confidence.clamp(0.0, 1.0),
            signals,
            public_ip,
            hostname,
            scope: public_ip.map(IpScope::classify),
        }
    }

    /// Verdict when detection was skipped or nothing answered
    pub fn unknown() -> Self {
        Self::new(None, 0.0, Vec::new(), None, None)
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn signals(&self) -> &[IspSignal] {
        &self.signals
    }

    pub fn public_ip(&self) -> Option<IpAddr> {
        self.public_ip
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn scope(&self) -> Option<IpScope> {
        self.scope
    }

    /// Whether a provider was named with at least `threshold` confidence
    pub fn is_reliable(&self, threshold: f64) -> bool {
        self.provider.is_some() && self.confidence >= threshold
    }
}

impl Default for IspVerdict {
    fn default() -> Self {
        Self::unknown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_classification() {
        let scope = |s: &str| IpScope::classify(s.parse().unwrap());
        assert_eq!(scope("192.168.1.10"), IpScope::Private);
        assert_eq!(scope("10.0.0.1"), IpScope::Private);
        assert_eq!(scope("100.72.1.1"), IpScope::Shared);
        assert_eq!(scope("100.128.0.1"), IpScope::Public);
        assert_eq!(scope("127.0.0.1"), IpScope::Loopback);
        assert_eq!(scope("200.142.10.1"), IpScope::Public);
        assert_eq!(scope("fd00::1"), IpScope::Private);
        assert_eq!(scope("2001:db8::1"), IpScope::Public);
    }

    #[test]
    fn test_confidence_clamped() {
        let v = IspVerdict::new(Some("Oi".into()), 1.7, vec![], None, None);
        assert_eq!(v.confidence(), 1.0);
        assert!(v.is_reliable(0.5));
    }

    #[test]
    fn test_unknown_is_unreliable() {
        let v = IspVerdict::unknown();
        assert!(v.provider().is_none());
        assert_eq!(v.confidence(), 0.0);
        assert!(!v.is_reliable(0.0));
        assert!(v.scope().is_none());
    }
}
