//! The current-IP seam consumed by the supervisor.

use async_trait::async_trait;
use std::net::IpAddr;

use crate::error::Result;

/// Something that knows the machine's current public IP address.
///
/// The production implementation is [`crate::ip::PublicIpSource`], which
/// caches the last known value and refreshes it on a background timer so
/// that many domain workers share one rate-limited acquisition pipeline.
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Best-known current public IP.
    ///
    /// Returns the cached value when one exists; otherwise acquires one
    /// synchronously first. Callers must not assume bounded latency on a
    /// cold cache: acquisition keeps trying sources until one succeeds.
    async fn current_ip(&self) -> Result<IpAddr>;
}
