//! Provider catalog: IP ranges, hostname suffixes and name aliases.

use ipnetwork::IpNetwork;
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::config::IspSettings;
use crate::error::DiagError;

/// Built-in rules for Brazilian residential providers
const BUILTIN: &[BuiltinProvider] = &[
    BuiltinProvider {
        name: "Vivo/Telefônica",
        ranges: &[
            "200.142.0.0/16",
            "191.36.0.0/16",
            "200.225.0.0/16",
            "187.72.0.0/16",
            "200.171.0.0/16",
            "177.37.0.0/16",
            "179.191.0.0/16",
            "201.17.0.0/16",
        ],
        hostnames: &[
            "telefonica.com.br",
            "telefonica.net.br",
            "vivo.com.br",
            "vivozap.com.br",
            "speedy.com.br",
            "telesp.net.br",
        ],
        aliases: &["vivo", "telefonica", "telefônica", "telefonica brasil", "telesp"],
    },
    BuiltinProvider {
        name: "Netflex (NET Claro)",
        ranges: &[
            "201.23.0.0/16",
            "201.6.0.0/16",
            "179.184.0.0/16",
            "201.22.0.0/16",
            "170.79.0.0/16",
            "170.244.0.0/16",
            "45.5.0.0/16",
        ],
        hostnames: &["netflex.com.br", "net.com.br", "embratel.net.br"],
        aliases: &["netflex", "net", "net servicos", "net claro", "embratel"],
    },
    BuiltinProvider {
        name: "Oi",
        ranges: &["200.147.0.0/16", "200.144.0.0/16", "201.35.0.0/16"],
        hostnames: &["oi.com.br", "oi.net.br", "telemar.net.br", "velox.com.br"],
        aliases: &["oi", "telemar", "velox", "brasil telecom"],
    },
    BuiltinProvider {
        name: "TIM",
        ranges: &["187.4.0.0/16", "200.155.0.0/16"],
        hostnames: &["tim.com.br", "intelig.net.br", "intelig.com.br"],
        aliases: &["tim", "tim celular", "intelig"],
    },
    BuiltinProvider {
        name: "CLARO",
        ranges: &["187.39.0.0/16"],
        hostnames: &["virtua.com.br", "claro.com.br"],
        aliases: &["claro", "virtua"],
    },
];

struct BuiltinProvider {
    name: &'static str,
    ranges: &'static [&'static str],
    hostnames: &'static [&'static str],
    aliases: &'static [&'static str],
}

#[derive(Debug, Clone)]
struct RangeEntry {
    network: IpNetwork,
    provider: String,
}

/// Lookup tables used to turn evidence into provider names
#[derive(Debug, Clone, Default)]
pub struct ProviderCatalog {
    /// Sorted by prefix length descending for longest-prefix-match
    ranges: Vec<RangeEntry>,
    /// (suffix, provider), lowercase without trailing dot
    hostnames: Vec<(String, String)>,
    /// (alias words, provider)
    aliases: Vec<(Vec<String>, String)>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in provider rules
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for provider in BUILTIN {
            for range in provider.ranges {
                if let Ok(network) = range.parse() {
                    catalog.insert_range(network, provider.name);
                }
            }
            for suffix in provider.hostnames {
                catalog.add_hostname(provider.name, suffix);
            }
            catalog.add_alias(provider.name, provider.name);
            for alias in provider.aliases {
                catalog.add_alias(provider.name, alias);
            }
        }
        catalog
    }

    /// Catalog described by the ISP settings.
    ///
    /// Configured entries come first so they win over built-in ones on
    /// identical prefixes.
    pub fn from_settings(settings: &IspSettings) -> Result<Self, DiagError> {
        let mut catalog = Self::new();

        for (provider, ranges) in &settings.ranges {
            for range in ranges {
                catalog.add_range(provider, range)?;
            }
            catalog.add_alias(provider, provider);
        }
        for (provider, suffixes) in &settings.hostnames {
            for suffix in suffixes {
                catalog.add_hostname(provider, suffix);
            }
            catalog.add_alias(provider, provider);
        }
        for (provider, aliases) in &settings.aliases {
            for alias in aliases {
                catalog.add_alias(provider, alias);
            }
        }

        if settings.builtin_catalog {
            catalog.extend(Self::builtin());
        }
        Ok(catalog)
    }

    /// Add a CIDR range; an unparsable range is a configuration error
    pub fn add_range(&mut self, provider: &str, cidr: &str) -> Result<(), DiagError> {
        let network: IpNetwork = cidr.trim().parse().map_err(|e| {
            DiagError::Configuration(format!("invalid range '{}' for {}: {}", cidr, provider, e))
        })?;
        self.insert_range(network, provider);
        Ok(())
    }

    fn insert_range(&mut self, network: IpNetwork, provider: &str) {
        // First provider registered for a prefix keeps it
        if self.ranges.iter().any(|r| r.network == network) {
            return;
        }
        self.ranges.push(RangeEntry {
            network,
            provider: provider.to_string(),
        });
        // Stable sort keeps registration order among equal lengths
        self.ranges.sort_by(|a, b| b.network.prefix().cmp(&a.network.prefix()));
    }

    pub fn add_hostname(&mut self, provider: &str, suffix: &str) {
        let suffix = normalize_host(suffix.trim_start_matches('.'));
        if suffix.is_empty() || self.hostnames.iter().any(|(s, _)| *s == suffix) {
            return;
        }
        self.hostnames.push((suffix, provider.to_string()));
    }

    pub fn add_alias(&mut self, provider: &str, alias: &str) {
        let words = words(alias);
        if words.is_empty() || self.aliases.iter().any(|(w, _)| *w == words) {
            return;
        }
        self.aliases.push((words, provider.to_string()));
    }

    /// Append `other`'s entries after this catalog's own
    pub fn extend(&mut self, other: ProviderCatalog) {
        for entry in other.ranges {
            self.insert_range(entry.network, &entry.provider);
        }
        for (suffix, provider) in other.hostnames {
            self.add_hostname(&provider, &suffix);
        }
        for (words, provider) in other.aliases {
            self.add_alias(&provider, &words.join(" "));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty() && self.hostnames.is_empty() && self.aliases.is_empty()
    }

    /// Longest matching range for `ip`
    pub fn match_ip(&self, ip: IpAddr) -> Option<(IpNetwork, &str)> {
        self.ranges
            .iter()
            .find(|r| r.network.contains(ip))
            .map(|r| (r.network, r.provider.as_str()))
    }

    /// Provider whose longest suffix matches `hostname` on a label boundary
    pub fn match_hostname(&self, hostname: &str) -> Option<&str> {
        let host = normalize_host(hostname);
        self.hostnames
            .iter()
            .filter(|(suffix, _)| {
                host == *suffix
                    || host
                        .strip_suffix(suffix.as_str())
                        .is_some_and(|head| head.ends_with('.'))
            })
            .max_by_key(|(suffix, _)| suffix.len())
            .map(|(_, provider)| provider.as_str())
    }

    /// Map a provider name reported by a lookup service onto a catalog name.
    ///
    /// The longest alias found as a whole-word run in `name` wins; unknown
    /// names are returned trimmed as-is.
    pub fn canonicalize(&self, name: &str) -> Option<String> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let haystack = words(name);

        let best = self
            .aliases
            .iter()
            .filter(|(alias, _)| contains_run(&haystack, alias))
            .max_by_key(|(alias, _)| alias.iter().map(String::len).sum::<usize>() + alias.len());

        Some(match best {
            Some((_, provider)) => provider.clone(),
            None => super::sanitize_display(name),
        })
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_lowercase()
}

/// Lowercase alphanumeric words; `AS1234` organisation prefixes dropped
fn words(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !(w.len() > 2 && w.starts_with("as") && w[2..].chars().all(|c| c.is_ascii_digit())))
        .collect()
}

fn contains_run(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}
