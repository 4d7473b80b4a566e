//! Current-IP acquisition.
//!
//! [`PublicIpSource`] discovers the host's public address from a rotating
//! list of HTTP "what is my IP" endpoints, with a named local interface as
//! the fallback once a whole round of endpoints has failed. The last known
//! value is cached and refreshed by a single background task on the polling
//! interval, so the number of configured domains never multiplies traffic
//! against rate-limited third-party services.
//!
//! Acquisition trades latency for availability: it keeps rotating sources
//! (with a backoff between attempts) until one of them yields an address.

use regex::Regex;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::{IpKind, Settings};
use crate::error::{Error, Result};
use crate::traits::IpSource;

/// Per-request HTTP timeout
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between failed acquisition attempts. Keeps a fully dark source
/// list from turning into a busy loop.
const PROBE_BACKOFF: Duration = Duration::from_millis(500);

static IPV4_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"((25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)")
        .expect("valid ipv4 pattern")
});

static IPV6_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(([0-9A-Fa-f]{1,4}:){1,7}[0-9A-Fa-f:]{1,4})").expect("valid ipv6 pattern")
});

/// Process-wide public-IP source with round-robin HTTP probing, interface
/// fallback and a cached last-known value.
///
/// The round-robin cursor and the cache are the only mutable state in the
/// core shared across tasks: many domain workers read the cache while the
/// refresh task writes it.
pub struct PublicIpSource {
    kind: IpKind,
    urls: Vec<String>,
    interface: Option<String>,
    cursor: AtomicUsize,
    cached: Mutex<Option<IpAddr>>,
    client: reqwest::Client,
}

impl PublicIpSource {
    /// Build the source from validated settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.ip_type,
            settings.effective_ip_urls(),
            settings.ip_interface.clone(),
        )
    }

    /// Build a source from explicit parts
    pub fn new(kind: IpKind, urls: Vec<String>, interface: Option<String>) -> Result<Self> {
        if urls.is_empty() && interface.is_none() {
            return Err(Error::ip_source("no HTTP endpoints and no interface configured"));
        }
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::ip_source(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            kind,
            urls,
            interface,
            cursor: AtomicUsize::new(0),
            cached: Mutex::new(None),
            client,
        })
    }

    /// Spawn the background refresh task.
    ///
    /// Re-acquires the address every `interval` independently of any
    /// domain's polling cadence, and stops once `shutdown` flips.
    pub fn spawn_refresh(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let source = Arc::clone(self);
        tokio::spawn(async move {
            debug!("ip refresh task started (interval {:?})", interval);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    changed = shutdown.changed() => {
                        // A dropped sender ends the task like a shutdown
                        // signal; otherwise changed() would keep returning
                        // instantly and skip the interval sleep.
                        if changed.is_err() {
                            debug!("ip refresh task stopping");
                            break;
                        }
                    }
                }
                if *shutdown.borrow() {
                    debug!("ip refresh task stopping");
                    break;
                }
                match source.acquire().await {
                    Ok(ip) => {
                        let mut cached = source.cached.lock().await;
                        if *cached != Some(ip) {
                            info!("public ip changed: {:?} -> {}", *cached, ip);
                        }
                        *cached = Some(ip);
                    }
                    Err(err) => warn!("ip refresh failed: {}", err),
                }
            }
        })
    }

    /// Acquire an address right now, bypassing the cache.
    ///
    /// HTTP endpoints are tried in round-robin order starting from the
    /// shared cursor; after every endpoint in the list has failed once, the
    /// configured interface is consulted. Keeps going until something
    /// succeeds, sleeping [`PROBE_BACKOFF`] between failed attempts.
    pub async fn acquire(&self) -> Result<IpAddr> {
        if self.urls.is_empty() {
            // Pure interface mode has nothing to rotate through.
            return self.interface_ip();
        }

        let mut failed_this_cycle = 0usize;
        loop {
            let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.urls.len();
            let url = &self.urls[idx];
            match self.fetch_from_url(url).await {
                Ok(ip) => {
                    debug!("acquired {} from {}", ip, url);
                    return Ok(ip);
                }
                Err(err) => {
                    warn!("ip endpoint {} failed: {}", url, err);
                    failed_this_cycle += 1;
                }
            }

            if failed_this_cycle >= self.urls.len() {
                failed_this_cycle = 0;
                if self.interface.is_some() {
                    match self.interface_ip() {
                        Ok(ip) => {
                            info!("all ip endpoints failed, using interface address {}", ip);
                            return Ok(ip);
                        }
                        Err(err) => warn!("interface fallback failed: {}", err),
                    }
                }
            }

            tokio::time::sleep(PROBE_BACKOFF).await;
        }
    }

    /// One HTTP probe: fetch the body and extract the first address-shaped
    /// substring of the active family.
    async fn fetch_from_url(&self, url: &str) -> Result<IpAddr> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::http(format!("{} returned {}", url, response.status())));
        }
        let body = response.text().await?;
        extract_ip(&body, self.kind)
            .ok_or_else(|| Error::ip_source(format!("{} returned no address-shaped text", url)))
    }

    /// First non-private, non-link-local address of the active family on
    /// the configured interface.
    fn interface_ip(&self) -> Result<IpAddr> {
        let name = self
            .interface
            .as_deref()
            .ok_or_else(|| Error::ip_source("no interface configured"))?;

        let addrs = if_addrs::get_if_addrs()
            .map_err(|e| Error::ip_source(format!("failed to list interfaces: {}", e)))?;

        addrs
            .iter()
            .filter(|iface| iface.name == name)
            .map(|iface| iface.ip())
            .find(|ip| matches_kind(*ip, self.kind) && is_public(*ip))
            .ok_or_else(|| {
                Error::ip_source(format!(
                    "interface {} has no usable {:?} address",
                    name, self.kind
                ))
            })
    }
}

#[async_trait::async_trait]
impl IpSource for PublicIpSource {
    async fn current_ip(&self) -> Result<IpAddr> {
        if let Some(ip) = *self.cached.lock().await {
            return Ok(ip);
        }
        let ip = self.acquire().await?;
        *self.cached.lock().await = Some(ip);
        Ok(ip)
    }
}

/// Extract the first address literal of the given family from free-form
/// text. Responses are not always bare literals; some services wrap the
/// address in HTML or JSON.
fn extract_ip(body: &str, kind: IpKind) -> Option<IpAddr> {
    match kind {
        IpKind::V4 => IPV4_PATTERN
            .find_iter(body)
            .filter_map(|m| m.as_str().parse().ok())
            .map(IpAddr::V4)
            .next(),
        IpKind::V6 => IPV6_PATTERN
            .find_iter(body)
            .filter_map(|m| m.as_str().parse().ok())
            .map(IpAddr::V6)
            .next(),
    }
}

fn matches_kind(ip: IpAddr, kind: IpKind) -> bool {
    match kind {
        IpKind::V4 => ip.is_ipv4(),
        IpKind::V6 => ip.is_ipv6(),
    }
}

/// Reject addresses that cannot be a public record value
fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !v4.is_loopback() && !v4.is_private() && !v4.is_link_local() && !v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            let link_local = (segments[0] & 0xffc0) == 0xfe80;
            let unique_local = (segments[0] & 0xfe00) == 0xfc00;
            !v6.is_loopback() && !v6.is_unspecified() && !link_local && !unique_local
        }
    }
}
