//! External seams of the core: provider adapters, IP acquisition and the
//! notification collaborator.

mod dns_provider;
mod ip_source;
mod notifier;

pub use dns_provider::{DnsProvider, ProviderFactory};
pub use ip_source::IpSource;
pub use notifier::{LogNotifier, Notifier};
