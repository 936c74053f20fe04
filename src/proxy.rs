//! DNS proxy orchestration.
//!
//! Loads the blacklist, wires the upstream transport into the resolver, binds
//! the UDP listener and runs until the listener stops.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AccessLists;
use crate::error::StartupError;
use crate::filter::{BlacklistLoader, HttpFetcher, SourceStore};
use crate::resolver::Resolver;
use crate::transport::udp::UdpTransport;
use crate::upstream::{RoundRobin, UpstreamKind, build_upstream};

/// How long a single blacklist source may take to download.
const SOURCE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// How often proxy statistics are logged.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the DNS proxy.
pub struct ProxyConfig {
    /// Local address to bind (e.g., 0.0.0.0:53)
    pub bind_addr: SocketAddr,
    /// Upstream servers, used in round-robin order
    pub upstreams: Vec<String>,
    pub upstream_kind: UpstreamKind,
    pub upstream_timeout: Duration,
    /// Blacklist sources plus the static black and white lists
    pub access_lists: AccessLists,
    /// Where downloaded source bodies are kept between runs
    pub cache_dir: PathBuf,
    /// Cap on concurrently handled queries
    pub max_inflight: usize,
    /// Reload the blacklist this often, never when `None`
    pub refresh_interval: Option<Duration>,
}

/// Run the DNS proxy with the given configuration.
///
/// Returns early only on startup failure; otherwise runs until the listener
/// task ends.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    let pool = RoundRobin::new(&config.upstreams)?;
    let upstream = build_upstream(config.upstream_kind, pool, config.upstream_timeout);

    let loader = Arc::new(BlacklistLoader::new(
        Arc::new(HttpFetcher::new(SOURCE_FETCH_TIMEOUT)),
        SourceStore::new(config.cache_dir.clone()),
    ));
    let blacklist = loader.load(&config.access_lists).await;
    let resolver = Arc::new(Resolver::new(blacklist, upstream));

    let udp = UdpTransport::bind(config.bind_addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: config.bind_addr,
            source,
        })?;

    info!(
        addr = %config.bind_addr,
        blocked = resolver.blocked_count(),
        "DNS proxy listening"
    );
    info!(
        protocol = resolver.protocol_name(),
        upstreams = %config.upstreams.join(", "),
        timeout_ms = config.upstream_timeout.as_millis() as u64,
        "Forwarding to upstreams"
    );

    let listener = udp.start(resolver.clone(), config.max_inflight);

    spawn_stats_logger(resolver.clone());

    if let Some(interval) = config.refresh_interval {
        spawn_refresher(resolver, loader, config.access_lists, interval);
    }

    if let Err(e) = listener.await {
        warn!(error = %e, "UDP listener stopped");
    }

    Ok(())
}

/// Log stats every minute.
fn spawn_stats_logger(resolver: Arc<Resolver>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_INTERVAL);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let stats = resolver.stats_snapshot_and_reset();
            info!(
                uptime_secs = stats.uptime_secs,
                cache = resolver.cache_len(),
                requests = stats.requests,
                forwarded = stats.forwarded,
                cached = stats.cached,
                blocked = stats.blocked,
                dropped = stats.dropped,
                failed = stats.failed,
                avg_response_ms = format!("{:.2}", stats.avg_response_ms),
                "stats"
            );
        }
    });
}

/// Periodically rebuild the blacklist and publish it once fully sorted.
fn spawn_refresher(
    resolver: Arc<Resolver>,
    loader: Arc<BlacklistLoader>,
    lists: AccessLists,
    every: Duration,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let blacklist = loader.load(&lists).await;
            info!(domains = blacklist.len(), "Blacklist refreshed");
            resolver.replace_blacklist(blacklist);
        }
    });
}
