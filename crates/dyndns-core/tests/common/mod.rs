//! Test doubles and helpers shared by the supervisor behavior tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dyndns_core::config::{DomainConfig, IpKind, ProviderCredentials, Settings};
use dyndns_core::error::Result;
use dyndns_core::traits::{DnsProvider, IpSource, Notifier, ProviderFactory};

/// What a mock adapter does when asked to update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    Succeed,
    Fail,
    Panic,
}

/// Adapter double that counts calls and records their arguments.
///
/// `cached_ip` plays the role of an adapter that tracks its own last-seen
/// IP, which lets tests drive the comparison without any DNS traffic.
pub struct MockProvider {
    behavior: MockBehavior,
    update_calls: AtomicUsize,
    recorded: Mutex<Vec<(String, String, IpAddr)>>,
    cached: Mutex<Option<IpAddr>>,
}

impl MockProvider {
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            update_calls: AtomicUsize::new(0),
            recorded: Mutex::new(Vec::new()),
            cached: Mutex::new(None),
        })
    }

    /// Pretend the provider already publishes `ip` for every name
    pub fn set_cached_ip(&self, ip: Option<IpAddr>) {
        *self.cached.lock().unwrap() = ip;
    }

    pub fn update_call_count(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn recorded_calls(&self) -> Vec<(String, String, IpAddr)> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl DnsProvider for MockProvider {
    async fn update_ip(&self, domain: &str, subdomain: &str, ip: IpAddr) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.recorded
            .lock()
            .unwrap()
            .push((domain.to_string(), subdomain.to_string(), ip));
        match self.behavior {
            MockBehavior::Succeed => Ok(()),
            MockBehavior::Fail => Err(dyndns_core::Error::provider("mock", "update rejected")),
            MockBehavior::Panic => {
                // Brief pause so crash/restart cycles interleave with other
                // workers instead of exhausting the budget instantly.
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                panic!("injected adapter panic")
            }
        }
    }

    fn cached_ip(&self, _fqdn: &str) -> Option<IpAddr> {
        *self.cached.lock().unwrap()
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Factory that hands out one shared mock adapter instance
pub struct MockFactory {
    provider: Arc<MockProvider>,
}

impl MockFactory {
    pub fn new(provider: Arc<MockProvider>) -> Self {
        Self { provider }
    }
}

impl ProviderFactory for MockFactory {
    fn create(&self, _credentials: &ProviderCredentials) -> Result<Arc<dyn DnsProvider>> {
        Ok(Arc::clone(&self.provider) as Arc<dyn DnsProvider>)
    }
}

/// IP source double returning a value the test can change at any time
pub struct ScriptedIpSource {
    ip: Mutex<IpAddr>,
}

impl ScriptedIpSource {
    pub fn new(ip: IpAddr) -> Arc<Self> {
        Arc::new(Self { ip: Mutex::new(ip) })
    }

    pub fn set(&self, ip: IpAddr) {
        *self.ip.lock().unwrap() = ip;
    }
}

#[async_trait]
impl IpSource for ScriptedIpSource {
    async fn current_ip(&self) -> Result<IpAddr> {
        Ok(*self.ip.lock().unwrap())
    }
}

/// Notifier double recording every notification
#[derive(Default)]
pub struct CountingNotifier {
    notifications: Mutex<Vec<(String, IpAddr)>>,
}

impl CountingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<(String, IpAddr)> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn notify(&self, fqdn: &str, new_ip: IpAddr) -> Result<()> {
        self.notifications
            .lock()
            .unwrap()
            .push((fqdn.to_string(), new_ip));
        Ok(())
    }
}

/// Settings for one domain under the single-provider topology
pub fn single_domain_settings(domain: &str, sub_domains: &[&str], interval: u64) -> Settings {
    Settings {
        domains: vec![DomainConfig {
            domain_name: domain.to_string(),
            sub_domains: sub_domains.iter().map(|s| s.to_string()).collect(),
            provider: None,
        }],
        provider: Some("mock".to_string()),
        credentials: ProviderCredentials::default(),
        providers: HashMap::new(),
        interval,
        ip_type: IpKind::V4,
        ip_url: None,
        ip_urls: vec!["https://unused.invalid/ip".to_string()],
        ipv6_url: None,
        ipv6_urls: Vec::new(),
        ip_interface: None,
        resolver: None,
        run_once: false,
    }
}

/// Bind the mock factory into a provider map for `settings`
pub fn bind_mock(
    settings: &Settings,
    provider: &Arc<MockProvider>,
) -> Arc<dyndns_core::BoundProviders> {
    let mut registry = dyndns_core::ProviderRegistry::new();
    registry.register("mock", Box::new(MockFactory::new(Arc::clone(provider))));
    Arc::new(registry.bind(settings).expect("mock binding"))
}

pub fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(a, b, c, d))
}

/// A local UDP nameserver answering every A query with the IP currently
/// stored in the returned handle.
pub mod nameserver {
    use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{RData, Record};
    use std::net::Ipv4Addr;
    use std::sync::{Arc, Mutex};
    use tokio::net::UdpSocket;

    pub struct Handle {
        ip: Arc<Mutex<Ipv4Addr>>,
        pub addr: String,
    }

    impl Handle {
        /// Change the IP served from now on
        pub fn serve(&self, ip: Ipv4Addr) {
            *self.ip.lock().unwrap() = ip;
        }
    }

    pub async fn spawn(initial: Ipv4Addr) -> Handle {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        let ip = Arc::new(Mutex::new(initial));
        let served = Arc::clone(&ip);

        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                let Ok(request) = Message::from_vec(&buf[..len]) else {
                    continue;
                };

                let mut response = Message::new();
                response
                    .set_id(request.id())
                    .set_message_type(MessageType::Response)
                    .set_op_code(OpCode::Query)
                    .set_recursion_desired(true)
                    .set_response_code(ResponseCode::NoError);
                if let Some(query) = request.queries().first() {
                    response.add_query(query.clone());
                    let answer = *served.lock().unwrap();
                    response.add_answer(Record::from_rdata(
                        query.name().clone(),
                        60,
                        RData::A(A(answer)),
                    ));
                }

                if let Ok(wire) = response.to_vec() {
                    let _ = socket.send_to(&wire, peer).await;
                }
            }
        });

        Handle { ip, addr }
    }
}
