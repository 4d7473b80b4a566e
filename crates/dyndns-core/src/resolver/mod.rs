//! Raw DNS query client.
//!
//! Answers "what IP does this hostname currently publish, according to a
//! specific nameserver". Going straight to a configured nameserver avoids
//! stale answers from OS and library resolver caches, which matters when
//! deciding whether an update is needed.
//!
//! Wire format serialization is delegated to `hickory-proto`; the query,
//! retry and response logic is owned here. A single UDP exchange is
//! performed per attempt. Only transport timeouts are retried; a server
//! that answers with a failure code answers authoritatively enough that
//! retrying the same question is pointless.

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use rand::Rng;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::{Error, Result};

/// Per-attempt exchange timeout
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Maximum UDP response size accepted
const MAX_RESPONSE_BYTES: usize = 4096;

/// Record type to query for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// IPv4 address record
    A,
    /// IPv6 address record
    Aaaa,
}

impl RecordKind {
    fn to_record_type(self) -> RecordType {
        match self {
            RecordKind::A => RecordType::A,
            RecordKind::Aaaa => RecordType::AAAA,
        }
    }
}

impl From<crate::config::IpKind> for RecordKind {
    fn from(kind: crate::config::IpKind) -> Self {
        match kind {
            crate::config::IpKind::V4 => RecordKind::A,
            crate::config::IpKind::V6 => RecordKind::Aaaa,
        }
    }
}

/// Minimal DNS query client over UDP.
///
/// Stateless per query beyond the server list; one instance is shared by
/// all domain workers.
pub struct Resolver {
    /// Nameserver endpoints ("host:53"); one is picked uniformly at random
    /// per attempt
    servers: Vec<String>,
    /// Total attempts per lookup
    retry_budget: usize,
    /// Per-attempt exchange timeout
    query_timeout: Duration,
}

impl Resolver {
    /// Create a resolver with the default retry budget of
    /// `2 × server count`.
    ///
    /// Servers without an explicit port get `:53` appended.
    pub fn new(servers: Vec<String>) -> Self {
        let retry_budget = servers.len().max(1) * 2;
        Self::with_retry(servers, retry_budget)
    }

    /// Create a resolver with an explicit total attempt budget
    pub fn with_retry(servers: Vec<String>, retry_budget: usize) -> Self {
        let servers = servers.into_iter().map(normalize_server).collect();
        Self {
            servers,
            retry_budget: retry_budget.max(1),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Override the per-attempt timeout
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Resolve `hostname` to its published addresses of the requested kind.
    ///
    /// A successful response with zero matching records is an error, never
    /// an empty success: callers must be able to distinguish "publishes
    /// nothing" from "publishes these".
    pub async fn lookup(&self, hostname: &str, kind: RecordKind) -> Result<Vec<IpAddr>> {
        if self.servers.is_empty() {
            return Err(Error::resolve("no nameserver configured"));
        }

        let query = build_query(hostname, kind)?;
        let wire = query
            .to_vec()
            .map_err(|e| Error::resolve(format!("failed to encode query: {}", e)))?;

        let mut remaining = self.retry_budget;
        loop {
            let server = {
                let idx = rand::thread_rng().gen_range(0..self.servers.len());
                self.servers[idx].clone()
            };
            remaining -= 1;

            match self.exchange(&wire, &server).await {
                Ok(response) => return extract_answers(&response, hostname, kind),
                Err(err) if err.is_timeout() && remaining > 0 => {
                    debug!(
                        "dns query for {} timed out against {}, {} attempts left",
                        hostname, server, remaining
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One UDP round trip against one server
    async fn exchange(&self, wire: &[u8], server: &str) -> Result<Message> {
        let server_addr = resolve_server_addr(server).await?;
        let bind_addr: SocketAddr = if server_addr.is_ipv4() {
            "0.0.0.0:0".parse().expect("valid literal")
        } else {
            "[::]:0".parse().expect("valid literal")
        };

        let socket = UdpSocket::bind(bind_addr).await?;
        socket.send_to(wire, server_addr).await?;

        let mut buf = vec![0u8; MAX_RESPONSE_BYTES];
        let (len, _peer) = tokio::time::timeout(self.query_timeout, socket.recv_from(&mut buf))
            .await
            .map_err(|_| Error::Timeout(self.query_timeout))??;

        Message::from_vec(&buf[..len])
            .map_err(|e| Error::resolve(format!("malformed response from {}: {}", server, e)))
    }
}

fn normalize_server(server: String) -> String {
    if server.contains(':') {
        server
    } else {
        format!("{}:53", server)
    }
}

async fn resolve_server_addr(server: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(server)
        .await?
        .next()
        .ok_or_else(|| Error::resolve(format!("nameserver {} has no address", server)))
}

fn build_query(hostname: &str, kind: RecordKind) -> Result<Message> {
    let name = Name::from_utf8(hostname)
        .map_err(|e| Error::resolve(format!("invalid hostname {}: {}", hostname, e)))?;

    let mut message = Message::new();
    message
        .set_id(rand::thread_rng().r#gen())
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(name, kind.to_record_type()));
    Ok(message)
}

fn extract_answers(response: &Message, hostname: &str, kind: RecordKind) -> Result<Vec<IpAddr>> {
    if response.response_code() != ResponseCode::NoError {
        return Err(Error::resolve(format!(
            "query for {} failed: {}",
            hostname,
            response.response_code()
        )));
    }

    let ips: Vec<IpAddr> = response
        .answers()
        .iter()
        .filter(|record| record.record_type() == kind.to_record_type())
        .filter_map(|record| match record.data() {
            Some(RData::A(a)) => Some(IpAddr::V4(a.0)),
            Some(RData::AAAA(aaaa)) => Some(IpAddr::V6(aaaa.0)),
            _ => None,
        })
        .collect();

    if ips.is_empty() {
        return Err(Error::resolve(format!(
            "{} has no {:?} records (wrong record type or unpublished name)",
            hostname, kind
        )));
    }
    Ok(ips)
}
