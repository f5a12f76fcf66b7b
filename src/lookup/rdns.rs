use async_trait::async_trait;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::{Resolver, TokioResolver};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::DiagError;

/// Reverse DNS capability used by the ISP detector
#[async_trait]
pub trait ReverseResolver: Send + Sync {
    /// PTR name for `ip`, without the trailing dot
    async fn reverse(&self, ip: IpAddr) -> Result<String, DiagError>;
}

/// DNS cache entry
struct CacheEntry {
    hostname: Option<String>,
    cached_at: Instant,
}

/// Reverse lookups through the system resolver, with caching
pub struct DnsLookup {
    resolver: TokioResolver,
    cache: RwLock<HashMap<IpAddr, CacheEntry>>,
    cache_ttl: Duration,
}

impl DnsLookup {
    pub fn new() -> Self {
        // Try system DNS config first, fall back to Google DNS if unavailable
        let resolver = match Resolver::builder_tokio() {
            Ok(builder) => builder.build(),
            Err(e) => {
                warn!(error = %e, "system DNS config unavailable, using Google DNS");
                Resolver::builder_with_config(
                    ResolverConfig::google(),
                    hickory_resolver::name_server::TokioConnectionProvider::default(),
                )
                .build()
            }
        };

        Self {
            resolver,
            cache: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_secs(3600), // 1 hour
        }
    }

    fn cached(&self, ip: IpAddr) -> Option<Option<String>> {
        let cache = self.cache.read();
        if let Some(entry) = cache.get(&ip)
            && entry.cached_at.elapsed() < self.cache_ttl
        {
            return Some(entry.hostname.clone());
        }
        None
    }
}

impl Default for DnsLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReverseResolver for DnsLookup {
    async fn reverse(&self, ip: IpAddr) -> Result<String, DiagError> {
        if let Some(hostname) = self.cached(ip) {
            return hostname.ok_or_else(|| DiagError::DnsResolutionFailure(format!("no PTR record for {}", ip)));
        }

        let result = match self.resolver.reverse_lookup(ip).await {
            Ok(lookup) => lookup
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_string())
                .ok_or_else(|| DiagError::DnsResolutionFailure(format!("no PTR record for {}", ip))),
            Err(e) => Err(DiagError::DnsResolutionFailure(e.to_string())),
        };
        debug!(%ip, ?result, "reverse lookup");

        // Cache result, negative answers included
        self.cache.write().insert(
            ip,
            CacheEntry {
                hostname: result.as_ref().ok().cloned(),
                cached_at: Instant::now(),
            },
        );

        result
    }
}
