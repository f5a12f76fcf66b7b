//! Provider detection: fuses weak signals into one confidence-scored verdict.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::catalog::ProviderCatalog;
use super::public_ip::{IpLookupService, ServiceAnswer};
use super::rdns::ReverseResolver;
use crate::state::{IspSignal, IspVerdict, SignalSource};
use crate::trace::DiagnosticObserver;

/// Gathers ISP signals from lookup services, the range table and reverse DNS
pub struct IspDetector {
    catalog: ProviderCatalog,
    services: Vec<Arc<dyn IpLookupService>>,
    resolver: Option<Arc<dyn ReverseResolver>>,
    observer: Arc<dyn DiagnosticObserver>,
    lookup_timeout: Duration,
}

impl IspDetector {
    pub fn new(
        catalog: ProviderCatalog,
        services: Vec<Arc<dyn IpLookupService>>,
        observer: Arc<dyn DiagnosticObserver>,
    ) -> Self {
        Self {
            catalog,
            services,
            resolver: None,
            observer,
            lookup_timeout: Duration::from_secs(10),
        }
    }

    /// Enable reverse-DNS signals
    pub fn with_resolver(mut self, resolver: Arc<dyn ReverseResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Upper bound for each service query and the reverse lookup
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Run every source and fuse the results. Never fails: a source that
    /// errors, times out or is cancelled contributes no signal.
    pub async fn detect(&self, cancel: &CancellationToken) -> IspVerdict {
        let answers = self.query_services(cancel).await;
        let ips: Vec<IpAddr> = answers.iter().map(|a| a.ip).collect();
        let agreed = majority_vote(&ips);
        debug!(answers = ips.len(), ?agreed, "public IP vote");

        let mut signals = Vec::new();

        // Range table on the agreed address, or on each disputed one
        let candidates: Vec<IpAddr> = match agreed {
            Some(ip) => vec![ip],
            None => {
                let mut distinct = ips.clone();
                distinct.sort();
                distinct.dedup();
                distinct
            }
        };
        for ip in candidates {
            if let Some((network, provider)) = self.catalog.match_ip(ip) {
                signals.push(IspSignal::new(
                    SignalSource::IpRangeTable,
                    Some(provider.to_string()),
                    format!("{} in {}", ip, network),
                ));
            }
        }

        let hostname = match agreed {
            Some(ip) => self.reverse(ip, cancel).await,
            None => None,
        };
        if let Some(host) = &hostname {
            let provider = self.catalog.match_hostname(host).map(str::to_string);
            signals.push(IspSignal::new(SignalSource::ReverseDns, provider, host.clone()));
        }

        for answer in &answers {
            if let Some(guess) = answer.provider.as_deref().and_then(|p| self.catalog.canonicalize(p)) {
                signals.push(IspSignal::new(
                    SignalSource::ExternalLookupService,
                    Some(guess),
                    answer.evidence.clone(),
                ));
            }
        }

        for signal in &signals {
            self.observer.signal_collected(signal);
        }

        let (provider, confidence) = fuse(&signals);
        info!(
            provider = provider.as_deref().unwrap_or("unknown"),
            confidence,
            signals = signals.len(),
            "ISP verdict"
        );
        IspVerdict::new(provider, confidence, signals, agreed, hostname)
    }

    /// Query all services concurrently; answers keep configuration order
    async fn query_services(&self, cancel: &CancellationToken) -> Vec<ServiceAnswer> {
        let queries = self.services.iter().map(|service| async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                r = tokio::time::timeout(self.lookup_timeout, service.lookup()) => r,
            };
            match result {
                Ok(Ok(answer)) => Some(answer),
                Ok(Err(e)) => {
                    debug!(service = service.name(), error = %e, "lookup service failed");
                    None
                }
                Err(_) => {
                    debug!(service = service.name(), "lookup service timed out");
                    None
                }
            }
        });
        futures::future::join_all(queries).await.into_iter().flatten().collect()
    }

    async fn reverse(&self, ip: IpAddr, cancel: &CancellationToken) -> Option<String> {
        let resolver = self.resolver.as_ref()?;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            r = tokio::time::timeout(self.lookup_timeout, resolver.reverse(ip)) => r,
        };
        match result {
            Ok(Ok(host)) if !host.is_empty() => Some(host),
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                debug!(%ip, error = %e, "reverse DNS failed");
                None
            }
            Err(_) => {
                debug!(%ip, "reverse DNS timed out");
                None
            }
        }
    }
}

/// Most frequent address; a tie for the top count yields None
pub fn majority_vote(ips: &[IpAddr]) -> Option<IpAddr> {
    let mut counts: HashMap<IpAddr, usize> = HashMap::new();
    for ip in ips {
        *counts.entry(*ip).or_default() += 1;
    }
    let top = counts.values().copied().max()?;
    let mut leaders = counts.into_iter().filter(|(_, n)| *n == top);
    let (winner, _) = leaders.next()?;
    match leaders.next() {
        Some(_) => None,
        None => Some(winner),
    }
}

/// Group claimed signals by provider.
///
/// The strictly largest group wins with confidence `group / total`, where
/// total counts every collected signal, claiming or not.
pub fn fuse(signals: &[IspSignal]) -> (Option<String>, f64) {
    let mut groups: HashMap<&str, usize> = HashMap::new();
    for provider in signals.iter().filter_map(|s| s.provider.as_deref()) {
        *groups.entry(provider).or_default() += 1;
    }
    let Some(top) = groups.values().copied().max() else {
        return (None, 0.0);
    };
    let leaders: Vec<&str> = groups
        .iter()
        .filter(|(_, n)| **n == top)
        .map(|(p, _)| *p)
        .collect();
    if leaders.len() != 1 {
        return (None, 0.0);
    }
    let confidence = (top as f64 / signals.len() as f64).clamp(0.0, 1.0);
    (Some(leaders[0].to_string()), confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagError;
    use crate::trace::NoopObserver;
    use async_trait::async_trait;
    use proptest::prelude::*;

    struct FixedService {
        name: &'static str,
        answer: Option<(&'static str, Option<&'static str>)>,
    }

    #[async_trait]
    impl IpLookupService for FixedService {
        fn name(&self) -> &str {
            self.name
        }

        async fn lookup(&self) -> Result<ServiceAnswer, DiagError> {
            match self.answer {
                Some((ip, provider)) => Ok(ServiceAnswer {
                    ip: ip.parse().unwrap(),
                    provider: provider.map(str::to_string),
                    evidence: self.name.to_string(),
                }),
                None => Err(DiagError::NetworkUnreachable(self.name.into())),
            }
        }
    }

    struct FixedResolver(Option<&'static str>);

    #[async_trait]
    impl ReverseResolver for FixedResolver {
        async fn reverse(&self, _ip: IpAddr) -> Result<String, DiagError> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| DiagError::DnsResolutionFailure("nxdomain".into()))
        }
    }

    fn service(name: &'static str, ip: &'static str) -> Arc<dyn IpLookupService> {
        Arc::new(FixedService {
            name,
            answer: Some((ip, None)),
        })
    }

    fn failing(name: &'static str) -> Arc<dyn IpLookupService> {
        Arc::new(FixedService { name, answer: None })
    }

    fn catalog() -> ProviderCatalog {
        let mut catalog = ProviderCatalog::new();
        catalog.add_range("ProviderX", "1.2.3.0/24").unwrap();
        catalog.add_range("ProviderY", "5.6.7.0/24").unwrap();
        catalog.add_hostname("ProviderX", "providerx.net");
        catalog.add_alias("ProviderX", "ProviderX");
        catalog
    }

    fn signal(provider: Option<&str>) -> IspSignal {
        IspSignal::new(SignalSource::IpRangeTable, provider.map(str::to_string), "e")
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_majority_vote() {
        assert_eq!(
            majority_vote(&[ip("1.2.3.4"), ip("1.2.3.4"), ip("5.6.7.8")]),
            Some(ip("1.2.3.4"))
        );
        assert_eq!(majority_vote(&[ip("1.2.3.4"), ip("5.6.7.8")]), None);
        assert_eq!(majority_vote(&[ip("9.9.9.9")]), Some(ip("9.9.9.9")));
        assert_eq!(majority_vote(&[]), None);
    }

    #[test]
    fn test_fuse() {
        assert_eq!(fuse(&[]), (None, 0.0));
        assert_eq!(fuse(&[signal(None)]), (None, 0.0));
        assert_eq!(
            fuse(&[signal(Some("A")), signal(Some("B"))]),
            (None, 0.0)
        );
        let (provider, confidence) = fuse(&[signal(Some("A")), signal(Some("A")), signal(Some("B")), signal(None)]);
        assert_eq!(provider.as_deref(), Some("A"));
        assert!((confidence - 0.5).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn proptest_confidence_grows_with_agreement(total in 2usize..12, agree in 1usize..12) {
            prop_assume!(agree < total);
            let build = |n: usize| -> Vec<IspSignal> {
                (0..total)
                    .map(|i| if i < n { signal(Some("A")) } else { signal(None) })
                    .collect()
            };
            let (_, lower) = fuse(&build(agree));
            let (provider, higher) = fuse(&build(agree + 1));
            prop_assert_eq!(provider.as_deref(), Some("A"));
            prop_assert!(higher > lower);
            prop_assert!(higher <= 1.0);
        }
    }

    #[tokio::test]
    async fn test_majority_range_and_rdns_agree() {
        let detector = IspDetector::new(
            catalog(),
            vec![
                service("a", "1.2.3.4"),
                service("b", "1.2.3.4"),
                service("c", "5.6.7.8"),
            ],
            Arc::new(NoopObserver),
        )
        .with_resolver(Arc::new(FixedResolver(Some("host-4.dsl.providerx.net"))));

        let verdict = detector.detect(&CancellationToken::new()).await;
        assert_eq!(verdict.provider(), Some("ProviderX"));
        assert_eq!(verdict.confidence(), 1.0);
        assert_eq!(verdict.public_ip(), Some(ip("1.2.3.4")));
        assert_eq!(verdict.hostname(), Some("host-4.dsl.providerx.net"));
        let sources: Vec<SignalSource> = verdict.signals().iter().map(|s| s.source).collect();
        assert_eq!(sources, vec![SignalSource::IpRangeTable, SignalSource::ReverseDns]);
    }

    #[tokio::test]
    async fn test_all_sources_fail() {
        let detector = IspDetector::new(
            catalog(),
            vec![failing("a"), failing("b")],
            Arc::new(NoopObserver),
        )
        .with_resolver(Arc::new(FixedResolver(None)));

        let verdict = detector.detect(&CancellationToken::new()).await;
        assert_eq!(verdict.provider(), None);
        assert_eq!(verdict.confidence(), 0.0);
        assert!(verdict.signals().is_empty());
        assert!(verdict.public_ip().is_none());
    }

    #[tokio::test]
    async fn test_disputed_ips_each_tried() {
        let detector = IspDetector::new(
            catalog(),
            vec![service("a", "1.2.3.4"), service("b", "5.6.7.8")],
            Arc::new(NoopObserver),
        )
        .with_resolver(Arc::new(FixedResolver(Some("never.asked"))));

        let verdict = detector.detect(&CancellationToken::new()).await;
        // One range signal per disputed address, tied: no verdict
        assert_eq!(verdict.signals().len(), 2);
        assert_eq!(verdict.provider(), None);
        assert_eq!(verdict.confidence(), 0.0);
        assert!(verdict.hostname().is_none());
    }

    #[tokio::test]
    async fn test_unmatched_hostname_dilutes_confidence() {
        let detector = IspDetector::new(
            catalog(),
            vec![
                Arc::new(FixedService {
                    name: "ipinfo",
                    answer: Some(("1.2.3.9", Some("AS64500 ProviderX Telecom"))),
                }),
                failing("b"),
            ],
            Arc::new(NoopObserver),
        )
        .with_resolver(Arc::new(FixedResolver(Some("cpe.unknown-isp.example"))));

        let verdict = detector.detect(&CancellationToken::new()).await;
        assert_eq!(verdict.provider(), Some("ProviderX"));
        assert_eq!(verdict.signals().len(), 3);
        assert!((verdict.confidence() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancelled_detection_is_unknown() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let detector = IspDetector::new(catalog(), vec![service("a", "1.2.3.4")], Arc::new(NoopObserver));
        let verdict = detector.detect(&cancel).await;
        assert_eq!(verdict.provider(), None);
        assert_eq!(verdict.confidence(), 0.0);
    }
}
