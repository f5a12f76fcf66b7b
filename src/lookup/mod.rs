pub mod catalog;
pub mod isp;
pub mod public_ip;
pub mod rdns;

pub use catalog::ProviderCatalog;
pub use isp::{IspDetector, fuse, majority_vote};
pub use public_ip::{HttpLookupService, IpLookupService, ServiceAnswer};
pub use rdns::{DnsLookup, ReverseResolver};

/// Sanitize a string for safe terminal display by removing control characters.
///
/// This filters out ASCII control characters (0x00-0x1F, 0x7F) and Unicode control
/// characters that could be used to inject terminal escape sequences.
pub(crate) fn sanitize_display(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control())
        .collect()
}
