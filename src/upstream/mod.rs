//! Upstream resolvers.
//!
//! Queries the proxy cannot answer locally are handed to one of two
//! interchangeable transports, chosen once at startup. Both pick their server
//! from a shared [`RoundRobin`] pool.

mod https;
mod pool;
mod udp;

pub use https::{HttpsUpstream, query_url};
pub use pool::RoundRobin;
pub use udp::UdpUpstream;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::dns::DnsMessage;
use crate::error::ResolveError;

/// Resolves a query against an upstream server.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send `query` upstream and return the raw response bytes.
    async fn resolve(&self, query: &DnsMessage) -> Result<Vec<u8>, ResolveError>;

    fn protocol_name(&self) -> &'static str;
}

/// Which transport to use for upstream queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpstreamKind {
    /// DNS-over-HTTPS GET requests.
    #[default]
    Https,
    /// Plain DNS over UDP port 53.
    Udp,
}

impl FromStr for UpstreamKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "https" | "doh" => Ok(Self::Https),
            "udp" => Ok(Self::Udp),
            other => Err(format!("unknown upstream mode '{other}' (expected https or udp)")),
        }
    }
}

impl fmt::Display for UpstreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Https => write!(f, "https"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// Create the configured upstream transport.
pub fn build_upstream(kind: UpstreamKind, pool: RoundRobin, timeout: Duration) -> Arc<dyn Upstream> {
    match kind {
        UpstreamKind::Https => Arc::new(HttpsUpstream::new(pool, timeout)),
        UpstreamKind::Udp => Arc::new(UdpUpstream::new(pool, timeout)),
    }
}
