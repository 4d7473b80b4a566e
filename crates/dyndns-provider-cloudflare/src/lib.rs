//! Cloudflare adapter for the dyndns update daemon.
//!
//! Implements the provider contract against the Cloudflare v4 API:
//! look up the zone for the domain, look up the record for the fully
//! qualified name, then PUT the new content (or POST a fresh record when
//! none exists yet). The adapter is single-shot and stateless across
//! calls; cadence and failure policy belong to the supervisor.
//!
//! Authentication uses an API token (`login_token` in the credentials
//! bag) with Zone:Read and DNS:Edit permissions. The token never appears
//! in logs or error messages.

use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use dyndns_core::config::ProviderCredentials;
use dyndns_core::traits::{DnsProvider, ProviderFactory};
use dyndns_core::{Error, Result};

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// HTTP timeout for API requests
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Record TTL pushed on create/update; 1 means "automatic" to Cloudflare
const AUTO_TTL: u32 = 1;

#[derive(Deserialize)]
struct ZoneListResponse {
    success: bool,
    result: Vec<Zone>,
}

#[derive(Deserialize)]
struct Zone {
    id: String,
}

#[derive(Deserialize)]
struct RecordListResponse {
    success: bool,
    result: Vec<DnsRecord>,
}

#[derive(Deserialize)]
struct DnsRecord {
    id: String,
    content: String,
}

#[derive(Deserialize)]
struct WriteResponse {
    success: bool,
}

/// Cloudflare DNS provider adapter
pub struct CloudflareProvider {
    api_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create an adapter bound to an API token
    pub fn new(api_token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_token, CLOUDFLARE_API_BASE)
    }

    /// Create an adapter against a non-default API endpoint (tests)
    pub fn with_base_url(api_token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config(
                "cloudflare requires a non-empty login_token",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::provider("cloudflare", format!("http client: {}", e)))?;
        Ok(Self {
            api_token,
            base_url: base_url.into(),
            client,
        })
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.api_token)
    }

    async fn zone_id(&self, domain: &str) -> Result<String> {
        let url = format!("{}/zones?name={}", self.base_url, domain);
        let response = self.auth(self.client.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(Error::provider(
                "cloudflare",
                format!("zone lookup for {} returned {}", domain, response.status()),
            ));
        }
        let zones: ZoneListResponse = response.json().await?;
        if !zones.success {
            return Err(Error::provider(
                "cloudflare",
                format!("zone lookup for {} was not successful", domain),
            ));
        }
        zones
            .result
            .into_iter()
            .next()
            .map(|zone| zone.id)
            .ok_or_else(|| Error::provider("cloudflare", format!("no zone found for {}", domain)))
    }

    async fn find_record(
        &self,
        zone_id: &str,
        record_type: &str,
        fqdn: &str,
    ) -> Result<Option<DnsRecord>> {
        let url = format!(
            "{}/zones/{}/dns_records?type={}&name={}",
            self.base_url, zone_id, record_type, fqdn
        );
        let response = self.auth(self.client.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(Error::provider(
                "cloudflare",
                format!("record lookup for {} returned {}", fqdn, response.status()),
            ));
        }
        let records: RecordListResponse = response.json().await?;
        if !records.success {
            return Err(Error::provider(
                "cloudflare",
                format!("record lookup for {} was not successful", fqdn),
            ));
        }
        Ok(records.result.into_iter().next())
    }

    async fn write_record(
        &self,
        zone_id: &str,
        existing: Option<&str>,
        record_type: &str,
        fqdn: &str,
        ip: IpAddr,
    ) -> Result<()> {
        let body = serde_json::json!({
            "type": record_type,
            "name": fqdn,
            "content": ip.to_string(),
            "ttl": AUTO_TTL,
            "proxied": false,
        });

        let request = match existing {
            Some(record_id) => self.client.put(format!(
                "{}/zones/{}/dns_records/{}",
                self.base_url, zone_id, record_id
            )),
            None => self
                .client
                .post(format!("{}/zones/{}/dns_records", self.base_url, zone_id)),
        };

        let response = self.auth(request).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::provider(
                "cloudflare",
                format!("write for {} returned {}", fqdn, status),
            ));
        }
        let write: WriteResponse = response.json().await?;
        if !write.success {
            return Err(Error::provider(
                "cloudflare",
                format!("write for {} was not successful", fqdn),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn update_ip(&self, domain: &str, subdomain: &str, ip: IpAddr) -> Result<()> {
        let fqdn = if subdomain == "@" {
            domain.to_string()
        } else {
            format!("{}.{}", subdomain, domain)
        };
        let record_type = if ip.is_ipv4() { "A" } else { "AAAA" };

        let zone_id = self.zone_id(domain).await?;
        let existing = self.find_record(&zone_id, record_type, &fqdn).await?;

        if let Some(record) = &existing {
            if record.content == ip.to_string() {
                debug!("{} already set to {}, nothing to write", fqdn, ip);
                return Ok(());
            }
        }

        self.write_record(
            &zone_id,
            existing.as_ref().map(|record| record.id.as_str()),
            record_type,
            &fqdn,
            ip,
        )
        .await?;
        info!("cloudflare record {} set to {}", fqdn, ip);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }
}

/// Factory binding `login_token` from the credentials bag
pub struct CloudflareFactory;

impl ProviderFactory for CloudflareFactory {
    fn create(&self, credentials: &ProviderCredentials) -> Result<Arc<dyn DnsProvider>> {
        Ok(Arc::new(CloudflareProvider::new(
            credentials.login_token.clone(),
        )?))
    }
}

/// Register this adapter under its provider name
pub fn register(registry: &mut dyndns_core::ProviderRegistry) {
    registry.register("cloudflare", Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn provider(server: &MockServer) -> CloudflareProvider {
        CloudflareProvider::with_base_url("test-token", server.base_url()).unwrap()
    }

    fn zone_mock(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(GET)
                .path("/zones")
                .query_param("name", "example.com");
            then.status(200)
                .json_body(serde_json::json!({
                    "success": true,
                    "result": [{ "id": "zone-1" }]
                }));
        })
    }

    #[tokio::test]
    async fn updates_an_existing_record_with_new_content() {
        let server = MockServer::start_async().await;
        let _zones = zone_mock(&server);
        let _records = server.mock(|when, then| {
            when.method(GET)
                .path("/zones/zone-1/dns_records")
                .query_param("type", "A")
                .query_param("name", "www.example.com");
            then.status(200).json_body(serde_json::json!({
                "success": true,
                "result": [{ "id": "rec-1", "content": "1.2.3.4" }]
            }));
        });
        let put = server.mock(|when, then| {
            when.method(PUT)
                .path("/zones/zone-1/dns_records/rec-1")
                .json_body_partial(r#"{ "content": "5.6.7.8", "type": "A" }"#);
            then.status(200)
                .json_body(serde_json::json!({ "success": true }));
        });

        provider(&server)
            .update_ip("example.com", "www", "5.6.7.8".parse().unwrap())
            .await
            .unwrap();
        put.assert_async().await;
    }

    #[tokio::test]
    async fn unchanged_content_writes_nothing() {
        let server = MockServer::start_async().await;
        let _zones = zone_mock(&server);
        let _records = server.mock(|when, then| {
            when.method(GET).path("/zones/zone-1/dns_records");
            then.status(200).json_body(serde_json::json!({
                "success": true,
                "result": [{ "id": "rec-1", "content": "5.6.7.8" }]
            }));
        });
        let put = server.mock(|when, then| {
            when.method(PUT);
            then.status(200)
                .json_body(serde_json::json!({ "success": true }));
        });

        provider(&server)
            .update_ip("example.com", "www", "5.6.7.8".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(put.hits_async().await, 0);
    }

    #[tokio::test]
    async fn missing_record_is_created() {
        let server = MockServer::start_async().await;
        let _zones = zone_mock(&server);
        let _records = server.mock(|when, then| {
            when.method(GET).path("/zones/zone-1/dns_records");
            then.status(200)
                .json_body(serde_json::json!({ "success": true, "result": [] }));
        });
        let post = server.mock(|when, then| {
            when.method(POST)
                .path("/zones/zone-1/dns_records")
                .json_body_partial(r#"{ "name": "example.com", "content": "5.6.7.8" }"#);
            then.status(200)
                .json_body(serde_json::json!({ "success": true }));
        });

        provider(&server)
            .update_ip("example.com", "@", "5.6.7.8".parse().unwrap())
            .await
            .unwrap();
        post.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_write_surfaces_a_provider_error() {
        let server = MockServer::start_async().await;
        let _zones = zone_mock(&server);
        let _records = server.mock(|when, then| {
            when.method(GET).path("/zones/zone-1/dns_records");
            then.status(200)
                .json_body(serde_json::json!({ "success": true, "result": [] }));
        });
        let _post = server.mock(|when, then| {
            when.method(POST);
            then.status(403)
                .json_body(serde_json::json!({ "success": false }));
        });

        let result = provider(&server)
            .update_ip("example.com", "@", "5.6.7.8".parse().unwrap())
            .await;
        assert!(matches!(result, Err(Error::Provider { .. })));
    }

    #[test]
    fn factory_rejects_empty_token() {
        let factory = CloudflareFactory;
        let credentials = ProviderCredentials::default();
        assert!(factory.create(&credentials).is_err());
    }

    #[test]
    fn debug_output_hides_the_token() {
        let provider = CloudflareProvider::new("secret-token").unwrap();
        let rendered = format!("{:?}", provider);
        assert!(!rendered.contains("secret-token"));
    }
}
