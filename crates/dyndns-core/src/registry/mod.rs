//! Provider resolution.
//!
//! Turns configuration into a name → credential-bound adapter map and
//! answers, per domain, "which adapter updates this domain". Adapter
//! construction goes through registered [`ProviderFactory`] objects rather
//! than a hardcoded type switch, so provider crates plug themselves in at
//! startup.
//!
//! Three configuration topologies are supported:
//!
//! 1. **Single** — a top-level `provider` name plus top-level credentials.
//! 2. **Multi** — a `providers` map only; every domain must name an entry.
//! 3. **Mixed** — both; domains without an override use the global
//!    provider.
//!
//! Binding is pure mapping with no I/O: deterministic and total over a
//! validated configuration, and it runs to completion before any domain
//! worker starts.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::{DomainConfig, Settings};
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, ProviderFactory};

/// Factory table, populated once at startup by the daemon (and by tests)
#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, Box<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a provider name
    pub fn register(&mut self, name: impl Into<String>, factory: Box<dyn ProviderFactory>) {
        self.factories.insert(name.into(), factory);
    }

    /// Whether a factory is registered under `name`
    pub fn has_factory(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Bind the configured topology to adapter instances.
    ///
    /// The global provider is instantiated first and recorded under its
    /// name; that entry takes precedence over a same-named entry in the
    /// `providers` map, so the global credentials win. Every remaining
    /// mapped name is then instantiated. Fails when the result would be
    /// empty, when a name has no registered factory, or when a domain
    /// references a name absent from the result.
    pub fn bind(&self, settings: &Settings) -> Result<BoundProviders> {
        let mut adapters: HashMap<String, Arc<dyn DnsProvider>> = HashMap::new();

        let global = settings.provider.as_deref().filter(|name| !name.is_empty());
        if let Some(name) = global {
            let adapter = self.instantiate(name, &settings.credentials)?;
            debug!("bound global provider {}", name);
            adapters.insert(name.to_string(), adapter);
        }

        for (name, credentials) in &settings.providers {
            if adapters.contains_key(name) {
                // Global credentials already won for this name.
                continue;
            }
            let adapter = self.instantiate(name, credentials)?;
            debug!("bound provider {}", name);
            adapters.insert(name.clone(), adapter);
        }

        if adapters.is_empty() {
            return Err(Error::config("no provider configured"));
        }

        let bound = BoundProviders {
            adapters,
            global: global.map(str::to_string),
        };

        // Every domain must resolve before any worker starts.
        for domain in &settings.domains {
            bound.resolve(domain)?;
        }

        Ok(bound)
    }

    fn instantiate(
        &self,
        name: &str,
        credentials: &crate::config::ProviderCredentials,
    ) -> Result<Arc<dyn DnsProvider>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::config(format!("unknown provider type: {}", name)))?;
        factory.create(credentials)
    }
}

/// The name → adapter map built once from settings; read-only afterwards
pub struct BoundProviders {
    adapters: HashMap<String, Arc<dyn DnsProvider>>,
    global: Option<String>,
}

impl BoundProviders {
    /// Number of distinct bound adapters
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapter is bound
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// The adapter responsible for `domain`.
    ///
    /// A domain with a provider override resolves to that named entry; a
    /// domain without one resolves to the global provider. Pure multi mode
    /// therefore requires every domain to carry an override.
    pub fn resolve(&self, domain: &DomainConfig) -> Result<Arc<dyn DnsProvider>> {
        match domain.provider_override() {
            Some(name) => self.adapters.get(name).cloned().ok_or_else(|| {
                Error::config(format!(
                    "domain {} references undefined provider {}",
                    domain.domain_name, name
                ))
            }),
            None => {
                let name = self.global.as_deref().ok_or_else(|| {
                    Error::config(format!(
                        "domain {} sets no provider and no global provider is configured",
                        domain.domain_name
                    ))
                })?;
                self.adapters.get(name).cloned().ok_or_else(|| {
                    Error::config(format!("global provider {} is not bound", name))
                })
            }
        }
    }
}
