//! # dyndns-core
//!
//! Core library for the dyndns update daemon: keep a set of DNS records
//! pointed at this host's current public IP, re-checking on an interval
//! and pushing an update only when the address actually changes.
//!
//! ## Architecture
//!
//! - **Resolver** — raw DNS query client used to discover what a hostname
//!   currently publishes, bypassing OS resolver caches.
//! - **PublicIpSource** — discovers the current public address from
//!   rotating HTTP endpoints or a local interface, with a shared cache and
//!   a background refresh task.
//! - **ProviderRegistry** — maps each configured domain to exactly one
//!   credential-bound provider adapter, across single / multi / mixed
//!   configuration topologies.
//! - **Supervisor** — one polling worker per domain, panic containment at
//!   the task boundary, and a global restart budget.
//!
//! Provider adapters (Cloudflare and friends) and the notification fan-out
//! live outside this crate behind the traits in [`traits`].

pub mod config;
pub mod error;
pub mod ip;
pub mod registry;
pub mod resolver;
pub mod supervisor;
pub mod traits;

pub use config::{DomainConfig, IpKind, ProviderCredentials, Settings};
pub use error::{Error, Result};
pub use ip::PublicIpSource;
pub use registry::{BoundProviders, ProviderRegistry};
pub use resolver::{RecordKind, Resolver};
pub use supervisor::{Supervisor, MAX_RESTARTS};
pub use traits::{DnsProvider, IpSource, LogNotifier, Notifier, ProviderFactory};
