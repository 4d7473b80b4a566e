//! Per-domain polling and failure containment.
//!
//! One [`DomainWorker`] runs forever per configured domain: check the
//! current public IP, compare it with what the name currently publishes,
//! push an update through the resolved provider adapter only when they
//! differ, then sleep for the configured interval. The first iteration
//! runs immediately so a fresh start converges without waiting.
//!
//! The [`Supervisor`] dispatches the workers and owns the failure policy.
//! Adapters are third-party-shaped and not trusted: a panic anywhere in a
//! worker is caught at the task boundary, logged, and answered with a
//! restart. The restart counter is process-wide, not per-domain — repeated
//! panics across any set of domains point at a systemic problem (bad
//! config, broken adapter), so once the ceiling is reached the supervisor
//! gives up and the daemon exits non-zero instead of masking it with
//! unbounded respawning.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{DomainConfig, Settings};
use crate::error::{Error, Result};
use crate::registry::BoundProviders;
use crate::resolver::{RecordKind, Resolver};
use crate::traits::{DnsProvider, IpSource, Notifier};

/// Global ceiling on worker restarts across all domains
pub const MAX_RESTARTS: usize = 5;

/// Dispatcher owning one polling worker per domain
pub struct Supervisor {
    domains: Vec<DomainConfig>,
    providers: Arc<BoundProviders>,
    ip_source: Arc<dyn IpSource>,
    resolver: Option<Arc<Resolver>>,
    notifier: Arc<dyn Notifier>,
    record_kind: RecordKind,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    /// Wire a supervisor from validated settings and bound collaborators.
    ///
    /// `providers` must come from a successful
    /// [`crate::registry::ProviderRegistry::bind`], which guarantees every
    /// domain resolves to an adapter.
    pub fn new(
        settings: &Settings,
        providers: Arc<BoundProviders>,
        ip_source: Arc<dyn IpSource>,
        resolver: Option<Arc<Resolver>>,
        notifier: Arc<dyn Notifier>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            domains: settings.domains.clone(),
            providers,
            ip_source,
            resolver,
            notifier,
            record_kind: RecordKind::from(settings.ip_type),
            interval: Duration::from_secs(settings.interval),
            shutdown,
        }
    }

    /// Run all domain workers until shutdown, restarting panicked workers
    /// under the global budget.
    ///
    /// Returns `Ok(())` on cooperative shutdown and
    /// [`Error::RestartBudgetExhausted`] when the ceiling is hit.
    pub async fn run(&self) -> Result<()> {
        let mut tasks = JoinSet::new();
        let mut domain_of_task = HashMap::new();

        for idx in 0..self.domains.len() {
            let handle = tasks.spawn(self.worker(idx)?.run());
            domain_of_task.insert(handle.id(), idx);
        }
        info!("supervising {} domain worker(s)", self.domains.len());

        let mut restarts = 0usize;
        while let Some(result) = tasks.join_next_with_id().await {
            match result {
                Ok((id, ())) => {
                    // Clean exit: the worker observed shutdown.
                    domain_of_task.remove(&id);
                }
                Err(join_err) if join_err.is_panic() => {
                    let idx = domain_of_task.remove(&join_err.id());
                    let name = idx
                        .map(|i| self.domains[i].domain_name.as_str())
                        .unwrap_or("<unknown>");
                    restarts += 1;
                    error!(
                        "worker for {} panicked ({} of {} restarts used): {:?}",
                        name, restarts, MAX_RESTARTS, join_err
                    );
                    if restarts >= MAX_RESTARTS {
                        return Err(Error::RestartBudgetExhausted { restarts });
                    }
                    if let Some(idx) = idx {
                        let handle = tasks.spawn(self.worker(idx)?.run());
                        domain_of_task.insert(handle.id(), idx);
                    }
                }
                Err(join_err) => {
                    // Cancelled tasks are not crashes.
                    domain_of_task.remove(&join_err.id());
                    warn!("worker task ended abnormally: {:?}", join_err);
                }
            }
        }

        info!("all domain workers stopped");
        Ok(())
    }

    /// Perform exactly one iteration per domain and report the combined
    /// outcome. Used for one-shot invocations instead of the daemon loop.
    ///
    /// Every domain gets its iteration even when an earlier one fails; the
    /// last failure is returned so the caller still exits non-zero.
    pub async fn run_once(&self) -> Result<()> {
        let mut failed = 0usize;
        let mut last_err = None;
        for idx in 0..self.domains.len() {
            if let Err(err) = self.worker(idx)?.poll_once().await {
                error!(
                    "one-shot update for {} failed: {}",
                    self.domains[idx].domain_name, err
                );
                failed += 1;
                last_err = Some(err);
            }
        }
        match last_err {
            Some(err) => {
                error!("{} of {} domain(s) failed", failed, self.domains.len());
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn worker(&self, idx: usize) -> Result<DomainWorker> {
        let domain = self.domains[idx].clone();
        let adapter = self.providers.resolve(&domain)?;
        Ok(DomainWorker {
            domain,
            adapter,
            ip_source: Arc::clone(&self.ip_source),
            resolver: self.resolver.clone(),
            notifier: Arc::clone(&self.notifier),
            record_kind: self.record_kind,
            interval: self.interval,
            shutdown: self.shutdown.clone(),
        })
    }
}

/// The polling loop for a single domain.
///
/// Iterations are strictly sequential: at most one update attempt for this
/// domain is in flight at any time. Nothing is ordered across domains.
struct DomainWorker {
    domain: DomainConfig,
    adapter: Arc<dyn DnsProvider>,
    ip_source: Arc<dyn IpSource>,
    resolver: Option<Arc<Resolver>>,
    notifier: Arc<dyn Notifier>,
    record_kind: RecordKind,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl DomainWorker {
    async fn run(mut self) {
        debug!("worker for {} started", self.domain.domain_name);
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            if let Err(err) = self.poll_once().await {
                error!(
                    "update cycle for {} failed: {}",
                    self.domain.domain_name, err
                );
            }

            // The interval sleep comes after the iteration so the first
            // one runs immediately. Shutdown is observed here too, never
            // by aborting an in-flight iteration.
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("worker for {} stopped", self.domain.domain_name);
    }

    /// One full iteration: acquire, compare per subdomain, update on
    /// change, notify on success.
    async fn poll_once(&self) -> Result<()> {
        let current = self.ip_source.current_ip().await?;

        let mut failed = 0usize;
        for subdomain in &self.domain.sub_domains {
            let fqdn = self.domain.fqdn(subdomain);

            if let Some(published) = self.published_ip(&fqdn).await {
                if published == current {
                    debug!("{} already publishes {}, skipping", fqdn, current);
                    continue;
                }
            }

            match self
                .adapter
                .update_ip(&self.domain.domain_name, subdomain, current)
                .await
            {
                Ok(()) => {
                    info!("updated {} -> {}", fqdn, current);
                    // Fire-and-forget: notification failures never feed
                    // back into the loop.
                    if let Err(err) = self.notifier.notify(&fqdn, current).await {
                        warn!("notification for {} failed: {}", fqdn, err);
                    }
                }
                Err(err) => {
                    // The published record stays stale, so the next
                    // interval's comparison retries naturally.
                    error!(
                        "provider {} rejected update for {}: {}",
                        self.adapter.provider_name(),
                        fqdn,
                        err
                    );
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(Error::provider(
                self.adapter.provider_name(),
                format!(
                    "{} of {} subdomain update(s) failed for {}",
                    failed,
                    self.domain.sub_domains.len(),
                    self.domain.domain_name
                ),
            ));
        }
        Ok(())
    }

    /// What the name currently publishes, or `None` when that cannot be
    /// determined. Unknown means "update anyway": delivery is
    /// at-least-once and adapters are idempotent.
    async fn published_ip(&self, fqdn: &str) -> Option<IpAddr> {
        if let Some(ip) = self.adapter.cached_ip(fqdn) {
            return Some(ip);
        }

        match &self.resolver {
            Some(resolver) => match resolver.lookup(fqdn, self.record_kind).await {
                Ok(ips) => ips.into_iter().next(),
                Err(err) => {
                    debug!("lookup of {} failed: {} (treating as unknown)", fqdn, err);
                    None
                }
            },
            None => self.system_lookup(fqdn).await,
        }
    }

    /// Platform resolution fallback when no nameserver is configured
    async fn system_lookup(&self, fqdn: &str) -> Option<IpAddr> {
        let addrs = tokio::net::lookup_host((fqdn, 0u16)).await.ok()?;
        let want_v4 = self.record_kind == RecordKind::A;
        addrs
            .map(|addr| addr.ip())
            .find(|ip| ip.is_ipv4() == want_v4)
    }
}
