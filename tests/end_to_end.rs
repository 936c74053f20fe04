//! Full query flow over a loopback UDP socket.

use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;

use nullroute::config::{AccessLists, Source};
use nullroute::dns::{BLOCKED_TTL, DnsMessage, DnsQuestion, DnsRecord, RecordData, TYPE_A};
use nullroute::error::ResolveError;
use nullroute::filter::{BlacklistCache, BlacklistLoader, HttpFetcher, SourceStore};
use nullroute::resolver::Resolver;
use nullroute::transport::udp::UdpTransport;
use nullroute::upstream::Upstream;

const EXAMPLE_ADDR: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);

/// Answers every query with a fixed A record and counts how often it is asked.
#[derive(Default)]
struct CountingUpstream {
    calls: AtomicUsize,
}

#[async_trait]
impl Upstream for CountingUpstream {
    async fn resolve(&self, query: &DnsMessage) -> Result<Vec<u8>, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let records = vec![DnsRecord::a(query.domain(), 300, EXAMPLE_ADDR)];
        Ok(DnsMessage::answer(query.id(), query.question.clone(), records).encode()?)
    }

    fn protocol_name(&self) -> &'static str {
        "STUB"
    }
}

struct FailingUpstream;

#[async_trait]
impl Upstream for FailingUpstream {
    async fn resolve(&self, _query: &DnsMessage) -> Result<Vec<u8>, ResolveError> {
        Err(ResolveError::Timeout {
            endpoint: "192.0.2.1".to_string(),
            timeout: Duration::from_millis(1),
        })
    }

    fn protocol_name(&self) -> &'static str {
        "STUB"
    }
}

fn blacklist(domains: &[&str]) -> BlacklistCache {
    let blacklist = BlacklistCache::new();
    for domain in domains {
        blacklist.add(domain);
    }
    blacklist.sort();
    blacklist
}

async fn start_proxy(resolver: Arc<Resolver>) -> SocketAddr {
    let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = transport.local_addr().unwrap();
    transport.start(resolver, 64);
    addr
}

async fn send(client: &UdpSocket, proxy: SocketAddr, packet: &[u8]) -> Option<DnsMessage> {
    client.send_to(packet, proxy).await.unwrap();
    let mut buf = [0u8; 512];
    match tokio::time::timeout(Duration::from_millis(500), client.recv(&mut buf)).await {
        Ok(Ok(len)) => Some(DnsMessage::decode(&buf[..len]).unwrap()),
        _ => None,
    }
}

async fn ask(client: &UdpSocket, proxy: SocketAddr, id: u16, domain: &str) -> Option<DnsMessage> {
    let packet = DnsMessage::query(id, DnsQuestion::new(domain, TYPE_A))
        .encode()
        .unwrap();
    send(client, proxy, &packet).await
}

#[tokio::test]
async fn blacklisted_domain_is_sinkholed() {
    let upstream = Arc::new(CountingUpstream::default());
    let resolver = Arc::new(Resolver::new(blacklist(&["ads.example.com"]), upstream.clone()));
    let proxy = start_proxy(resolver).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let answer = ask(&client, proxy, 0x1234, "ads.example.com").await.unwrap();

    assert_eq!(answer.id(), 0x1234);
    assert_eq!(answer.answers.len(), 1);
    assert_eq!(answer.answers[0].ttl, BLOCKED_TTL);
    assert_eq!(answer.answers[0].data, RecordData::A(Ipv4Addr::UNSPECIFIED));
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn repeated_query_is_served_from_cache() {
    let upstream = Arc::new(CountingUpstream::default());
    let resolver = Arc::new(Resolver::new(blacklist(&[]), upstream.clone()));
    let proxy = start_proxy(resolver).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let first = ask(&client, proxy, 1, "example.com").await.unwrap();
    let second = ask(&client, proxy, 2, "example.com").await.unwrap();

    assert_eq!(first.id(), 1);
    assert_eq!(second.id(), 2);
    for answer in [&first, &second] {
        assert_eq!(answer.answers[0].ttl, 300);
        assert_eq!(answer.answers[0].data, RecordData::A(EXAMPLE_ADDR));
    }
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_source_does_not_stop_other_sources() {
    let dir = tempfile::tempdir().unwrap();
    let hosts = dir.path().join("hosts.txt");
    std::fs::write(&hosts, "# tracker list\n0.0.0.0 tracker.example.net\n").unwrap();

    let lists = AccessLists {
        sources: vec![
            Source::new("http://127.0.0.1:1/unreachable.txt"),
            Source::new(hosts.to_str().unwrap()),
        ],
        blacklist: vec!["static.example.org".to_string()],
        whitelist: Vec::new(),
    };
    let loader = BlacklistLoader::new(
        Arc::new(HttpFetcher::new(Duration::from_secs(2))),
        SourceStore::new(dir.path().join("store")),
    );

    let cache = loader.load(&lists).await;

    assert!(cache.is_sorted());
    assert!(cache.contains("tracker.example.net"));
    assert!(cache.contains("static.example.org"));
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn malformed_packet_gets_no_reply_and_listener_survives() {
    let upstream = Arc::new(CountingUpstream::default());
    let resolver = Arc::new(Resolver::new(blacklist(&[]), upstream.clone()));
    let proxy = start_proxy(resolver).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    assert!(send(&client, proxy, &[0xDE, 0xAD, 0xBE]).await.is_none());

    let answer = ask(&client, proxy, 9, "example.com").await.unwrap();
    assert_eq!(answer.id(), 9);
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upstream_failure_gets_no_reply() {
    let resolver = Arc::new(Resolver::new(blacklist(&[]), Arc::new(FailingUpstream)));
    let proxy = start_proxy(resolver.clone()).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    assert!(ask(&client, proxy, 3, "example.com").await.is_none());
    assert_eq!(resolver.cache_len(), 0);
    assert_eq!(resolver.stats().failed.load(Ordering::Relaxed), 1);
}
