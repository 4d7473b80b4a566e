//! Configuration types for the dyndns daemon.
//!
//! These mirror the settings file consumed at startup. Loading and parsing
//! the file itself is the daemon's job; the core only validates the
//! deserialized shape and fails fast before any worker is launched.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default polling interval in seconds
const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Domains to keep updated
    pub domains: Vec<DomainConfig>,

    /// Global provider name (single and mixed topologies)
    #[serde(default)]
    pub provider: Option<String>,

    /// Credentials for the global provider, flattened into the top level
    /// of the settings file
    #[serde(flatten)]
    pub credentials: ProviderCredentials,

    /// Named providers map (multi and mixed topologies)
    #[serde(default)]
    pub providers: HashMap<String, ProviderCredentials>,

    /// Polling interval in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Which address family to publish
    #[serde(default)]
    pub ip_type: IpKind,

    /// Legacy single "what is my IP" endpoint (IPv4)
    #[serde(default)]
    pub ip_url: Option<String>,

    /// Round-robin "what is my IP" endpoints (IPv4)
    #[serde(default)]
    pub ip_urls: Vec<String>,

    /// Legacy single endpoint (IPv6)
    #[serde(default)]
    pub ipv6_url: Option<String>,

    /// Round-robin endpoints (IPv6)
    #[serde(default)]
    pub ipv6_urls: Vec<String>,

    /// Local network interface to read the address from when every HTTP
    /// endpoint fails (or when no endpoint is configured)
    #[serde(default)]
    pub ip_interface: Option<String>,

    /// Nameserver used to discover the currently published IP, bypassing
    /// OS resolver caches. Falls back to platform resolution when unset.
    #[serde(default)]
    pub resolver: Option<String>,

    /// Perform exactly one iteration per domain and exit
    #[serde(default)]
    pub run_once: bool,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl Settings {
    /// The effective endpoint list for the active address family.
    ///
    /// The list fields always win; a legacy single-URL field is treated as
    /// a one-element list when the list is empty.
    pub fn effective_ip_urls(&self) -> Vec<String> {
        let (list, single) = match self.ip_type {
            IpKind::V4 => (&self.ip_urls, &self.ip_url),
            IpKind::V6 => (&self.ipv6_urls, &self.ipv6_url),
        };
        if !list.is_empty() {
            list.clone()
        } else {
            single.iter().cloned().collect()
        }
    }

    /// Validate the settings before anything starts.
    ///
    /// Topology consistency (every domain resolving to a known provider)
    /// is checked when the registry binds adapters; this catches the
    /// structural problems that do not need the factory table.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.domains.is_empty() {
            return Err(crate::Error::config("no domains configured"));
        }
        for domain in &self.domains {
            if domain.domain_name.is_empty() {
                return Err(crate::Error::config("domain with empty name"));
            }
            if domain.sub_domains.is_empty() {
                return Err(crate::Error::config(format!(
                    "domain {} has no subdomains (use \"@\" for the apex)",
                    domain.domain_name
                )));
            }
        }
        if self.provider.is_none() && self.providers.is_empty() {
            return Err(crate::Error::config(
                "no provider configured: set `provider` or a `providers` map",
            ));
        }
        if self.interval == 0 {
            return Err(crate::Error::config("interval must be > 0 seconds"));
        }
        if self.effective_ip_urls().is_empty() && self.ip_interface.is_none() {
            return Err(crate::Error::config(
                "no IP source configured: set ip_urls (or ipv6_urls) or ip_interface",
            ));
        }
        Ok(())
    }
}

/// One managed domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Bare domain name (e.g. "example.com")
    pub domain_name: String,

    /// Subdomain labels; the sentinel "@" stands for the apex
    pub sub_domains: Vec<String>,

    /// Optional provider override; when unset the global provider applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl DomainConfig {
    /// Fully qualified name for a subdomain of this domain.
    ///
    /// The apex sentinel "@" maps to the bare domain name.
    pub fn fqdn(&self, subdomain: &str) -> String {
        if subdomain == "@" {
            self.domain_name.clone()
        } else {
            format!("{}.{}", subdomain, self.domain_name)
        }
    }

    /// The provider override, treating an empty string like "unset"
    pub fn provider_override(&self) -> Option<&str> {
        self.provider.as_deref().filter(|name| !name.is_empty())
    }
}

/// Union of every credential field any adapter might need.
///
/// Each adapter reads only the fields it needs and fails fast when a
/// required one is empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderCredentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub login_token: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub app_secret: String,
    #[serde(default)]
    pub consumer_key: String,
}

/// Address family to publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpKind {
    /// IPv4 / A records
    #[default]
    #[serde(rename = "IPV4", alias = "ipv4")]
    V4,
    /// IPv6 / AAAA records
    #[serde(rename = "IPV6", alias = "ipv6")]
    V6,
}
