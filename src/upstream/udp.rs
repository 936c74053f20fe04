//! Plain DNS over UDP upstream.
//!
//! Each query opens a fresh socket, sends once and waits for a single reply
//! of at most 512 bytes. No retries.

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{UdpSocket, lookup_host};
use tracing::debug;

use super::{RoundRobin, Upstream};
use crate::dns::DnsMessage;
use crate::error::ResolveError;

const DNS_PORT: u16 = 53;
const MAX_UDP_RESPONSE_SIZE: usize = 512;

/// UDP transport over a pool of servers.
pub struct UdpUpstream {
    pool: RoundRobin,
    timeout: Duration,
}

impl UdpUpstream {
    pub fn new(pool: RoundRobin, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl Upstream for UdpUpstream {
    async fn resolve(&self, query: &DnsMessage) -> Result<Vec<u8>, ResolveError> {
        let packed = query.encode()?;
        let server = self.pool.next_endpoint();

        debug!(server, domain = query.domain(), "Sending UDP query");

        tokio::time::timeout(self.timeout, exchange(server, &packed))
            .await
            .map_err(|_| ResolveError::Timeout {
                endpoint: server.to_string(),
                timeout: self.timeout,
            })?
    }

    fn protocol_name(&self) -> &'static str {
        "UDP"
    }
}

/// Socket address for an endpoint given as `ip`, `ip:port` or `host`.
async fn server_addr(server: &str) -> Result<SocketAddr, ResolveError> {
    if let Ok(addr) = server.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = server.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DNS_PORT));
    }
    lookup_host((server, DNS_PORT))
        .await?
        .next()
        .ok_or_else(|| ResolveError::Lookup(server.to_string()))
}

async fn exchange(server: &str, packed: &[u8]) -> Result<Vec<u8>, ResolveError> {
    let addr = server_addr(server).await?;
    let local: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(local).await?;
    socket.connect(addr).await?;
    socket.send(packed).await?;

    let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
    let len = socket.recv(&mut buf).await?;
    buf.truncate(len);

    Ok(buf)
}
