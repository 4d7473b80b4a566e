//! Notification fan-out collaborator.
//!
//! The real fan-out (mail, Slack, Telegram, webhooks) lives outside the
//! core. The supervisor fires one notification per successful update and
//! only ever logs a failure; notification errors never feed back into the
//! polling loop.

use async_trait::async_trait;
use std::net::IpAddr;
use tracing::info;

use crate::error::Result;

/// Fire-and-forget notification sink
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Report that `fqdn` now publishes `new_ip`
    async fn notify(&self, fqdn: &str, new_ip: IpAddr) -> Result<()>;
}

/// Default notifier: an info-level log line, nothing else
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, fqdn: &str, new_ip: IpAddr) -> Result<()> {
        info!("record updated: {} -> {}", fqdn, new_ip);
        Ok(())
    }
}
