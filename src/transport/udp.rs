//! UDP transport for DNS queries.
//!
//! One task blocks on `recv_from`; every datagram is handed to a freshly
//! spawned task that runs the resolver pipeline and sends the reply, if any,
//! back to the sender.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::QueryError;
use crate::resolver::{QueryAction, Resolver};

use super::MAX_DNS_PACKET_SIZE;

/// UDP listener for the proxy.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the receive loop.
    ///
    /// At most `max_inflight` query tasks run at once. Packets arriving while
    /// the limit is reached are dropped rather than queued.
    pub fn start(self, resolver: Arc<Resolver>, max_inflight: usize) -> JoinHandle<()> {
        let limit = Arc::new(Semaphore::new(max_inflight.max(1)));
        tokio::spawn(run(self.socket, resolver, limit))
    }
}

async fn run(socket: Arc<UdpSocket>, resolver: Arc<Resolver>, limit: Arc<Semaphore>) {
    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "UDP recv error");
                continue;
            }
        };

        let Ok(permit) = limit.clone().try_acquire_owned() else {
            warn!(client = %src, "Too many queries in flight, dropping packet");
            resolver.stats().record_dropped();
            continue;
        };

        let packet = buf[..len].to_vec();
        let socket = socket.clone();
        let resolver = resolver.clone();

        tokio::spawn(async move {
            handle_packet(&socket, &resolver, &packet, src).await;
            drop(permit);
        });
    }
}

async fn handle_packet(socket: &UdpSocket, resolver: &Resolver, packet: &[u8], src: SocketAddr) {
    let start_time = Instant::now();

    let action = match resolver.handle(packet).await {
        Ok(action) => action,
        Err(QueryError::Decode(e)) => {
            debug!(client = %src, error = %e, "Dropping malformed packet");
            resolver.stats().record_dropped();
            return;
        }
        Err(e) => {
            warn!(client = %src, error = %e, "Query failed");
            resolver.stats().record_failed();
            return;
        }
    };

    if let Err(e) = socket.send_to(action.response(), src).await {
        warn!(client = %src, error = %e, "UDP response error");
        resolver.stats().record_failed();
        return;
    }

    let total_ms = start_time.elapsed().as_secs_f64() * 1000.0;
    let stats = resolver.stats();

    match &action {
        QueryAction::Blocked { domain, .. } => {
            stats.record_blocked(total_ms);
            debug!(domain = %domain, total_ms, "BLOCKED");
        }
        QueryAction::Cached { domain, .. } => {
            stats.record_cached(total_ms);
            debug!(domain = %domain, total_ms, "CACHED");
        }
        QueryAction::Forwarded {
            domain,
            answer,
            upstream_time,
            ..
        } => {
            stats.record_forwarded(total_ms);
            debug!(
                domain = %domain,
                total_ms,
                upstream_ms = upstream_time.as_secs_f64() * 1000.0,
                from = %src,
                "FORWARDED"
            );
            for addr in answer.addresses() {
                debug!(domain = %domain, %addr, "Resolved");
            }
        }
    }
}
