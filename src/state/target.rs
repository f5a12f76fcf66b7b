use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::DiagError;

/// Maximum length of a DNS name in text form
const MAX_HOSTNAME_LEN: usize = 253;
/// Maximum length of a single DNS label
const MAX_LABEL_LEN: usize = 63;

/// Host under diagnosis: an IP literal or a hostname
///
/// Validated once at construction; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target {
    host: String,
}

impl Target {
    pub fn new(host: impl Into<String>) -> Result<Self, DiagError> {
        let raw = host.into();
        let host = raw.trim();

        if host.is_empty() {
            return Err(invalid(&raw, "target cannot be empty"));
        }

        if host.parse::<IpAddr>().is_err() {
            validate_hostname(host).map_err(|reason| invalid(&raw, reason))?;
        }

        Ok(Self {
            host: host.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.host
    }

    /// The target as an IP address, if it is an IP literal
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    pub fn is_ipv6(&self) -> bool {
        self.ip().is_some_and(|ip| ip.is_ipv6())
    }
}

fn invalid(target: &str, reason: impl Into<String>) -> DiagError {
    DiagError::InvalidTarget {
        target: target.to_string(),
        reason: reason.into(),
    }
}

fn validate_hostname(host: &str) -> Result<(), String> {
    let host = host.strip_suffix('.').unwrap_or(host);

    if host.is_empty() || host.len() > MAX_HOSTNAME_LEN {
        return Err(format!("hostname must be 1-{} characters", MAX_HOSTNAME_LEN));
    }

    for label in host.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(format!("label '{}' must be 1-{} characters", label, MAX_LABEL_LEN));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(format!("label '{}' contains invalid characters", label));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!("label '{}' cannot start or end with '-'", label));
        }
    }

    Ok(())
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host)
    }
}

impl FromStr for Target {
    type Err = DiagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Target {
    type Error = DiagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.host
    }
}
