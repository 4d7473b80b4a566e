//! The provider adapter contract.
//!
//! Each DNS-hosting vendor (Cloudflare, DNSPod, AliDNS, ...) is wrapped in
//! one adapter implementing [`DnsProvider`]. Adapters are interchangeable:
//! the supervisor only ever asks them to write one record value.
//!
//! Adapters stay deliberately dumb. They must not retry, sleep or spawn
//! tasks; a rejected update is returned as an error and the next polling
//! interval retries naturally, because the published record is still stale.

use async_trait::async_trait;
use std::net::IpAddr;

use crate::config::ProviderCredentials;
use crate::error::Result;

/// Trait for DNS provider adapter implementations.
///
/// `update_ip` must be idempotent: the supervisor may deliver the same new
/// IP more than once (at-least-once semantics), and repeating the call must
/// be safe.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Write `ip` as the record value for `subdomain` under `domain`.
    ///
    /// `subdomain` may be the apex sentinel `"@"`, meaning the bare domain.
    async fn update_ip(&self, domain: &str, subdomain: &str, ip: IpAddr) -> Result<()>;

    /// The IP this adapter last pushed for `fqdn`, when it tracks one.
    ///
    /// Adapters that remember their own last-seen value can expose it here
    /// to spare the supervisor a DNS lookup. `None` defers to the
    /// resolver.
    fn cached_ip(&self, _fqdn: &str) -> Option<IpAddr> {
        None
    }

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}

/// One-time credential binding for a provider adapter.
///
/// Factories are registered under a provider name at startup; the registry
/// invokes them while binding the configured topology. A factory must fail
/// fast when a credential field it requires is empty.
pub trait ProviderFactory: Send + Sync {
    /// Create an adapter bound to the given credentials
    fn create(&self, credentials: &ProviderCredentials) -> Result<std::sync::Arc<dyn DnsProvider>>;
}
