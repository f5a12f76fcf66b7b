use async_trait::async_trait;
use serde_json::Value;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::DiagError;

/// What one lookup service reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAnswer {
    pub ip: IpAddr,
    /// Provider or organisation name, when the service reports one
    pub provider: Option<String>,
    /// Service identity, kept as signal evidence
    pub evidence: String,
}

/// A "what is my IP" service
#[async_trait]
pub trait IpLookupService: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self) -> Result<ServiceAnswer, DiagError>;
}

/// Plain HTTP(S) lookup service answering in text or JSON
pub struct HttpLookupService {
    url: String,
    client: reqwest::Client,
}

impl HttpLookupService {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DiagError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("netdiag/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DiagError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl IpLookupService for HttpLookupService {
    fn name(&self) -> &str {
        &self.url
    }

    async fn lookup(&self) -> Result<ServiceAnswer, DiagError> {
        let unreachable = |e: reqwest::Error| DiagError::NetworkUnreachable(format!("{}: {}", self.url, e));

        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(unreachable)?
            .text()
            .await
            .map_err(unreachable)?;

        let (ip, provider) = parse_body(&body).ok_or_else(|| {
            DiagError::NetworkUnreachable(format!("{}: no address in response", self.url))
        })?;
        Ok(ServiceAnswer {
            ip,
            provider,
            evidence: self.url.clone(),
        })
    }
}

/// Extract the address and optional provider from a service response.
///
/// JSON bodies are read from `ip`, `origin` (first entry when proxied) or
/// `query`, with the provider from `isp` or `org`. Anything else is read as
/// a bare address.
pub fn parse_body(body: &str) -> Option<(IpAddr, Option<String>)> {
    let body = body.trim();
    if body.starts_with('{') {
        let value: Value = serde_json::from_str(body).ok()?;
        let ip = ["ip", "origin", "query"]
            .iter()
            .filter_map(|key| value.get(key).and_then(Value::as_str))
            .find_map(|s| s.split(',').next().and_then(|s| s.trim().parse().ok()))?;
        let provider = ["isp", "org"]
            .iter()
            .filter_map(|key| value.get(key).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string);
        return Some((ip, provider));
    }
    body.split_whitespace().next()?.parse().ok().map(|ip| (ip, None))
}
