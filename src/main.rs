use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use nullroute::config::AccessLists;
use nullroute::proxy::{self, ProxyConfig};
use nullroute::transport::DEFAULT_MAX_INFLIGHT;
use nullroute::upstream::UpstreamKind;

#[derive(Parser)]
#[command(name = "nullroute")]
#[command(about = "DNS forwarding proxy that sinkholes ad and tracker domains", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "NULLROUTE_BIND", default_value = "0.0.0.0:53")]
    bind: SocketAddr,

    /// JSON file with blacklist sources, static blacklist and whitelist
    #[arg(short, long, env = "NULLROUTE_CONFIG")]
    config: Option<PathBuf>,

    /// Upstream servers, comma separated or repeated
    #[arg(
        short,
        long,
        env = "NULLROUTE_UPSTREAM",
        value_delimiter = ',',
        default_value = "1.1.1.1,1.0.0.1"
    )]
    upstream: Vec<String>,

    /// Upstream transport: https or udp
    #[arg(short, long, env = "NULLROUTE_MODE", default_value_t = UpstreamKind::Https)]
    mode: UpstreamKind,

    /// Directory for downloaded blacklist sources
    #[arg(long, env = "NULLROUTE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Upstream query timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    /// Maximum number of queries handled at once
    #[arg(long, default_value_t = DEFAULT_MAX_INFLIGHT)]
    max_inflight: usize,

    /// Reload the blacklist every N seconds (0 disables)
    #[arg(long, default_value = "0")]
    refresh_secs: u64,

    /// Log every query and the addresses it resolved to
    #[arg(short, long, env = "NULLROUTE_DEBUG")]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "warn,nullroute=debug"
    } else {
        "warn,nullroute=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let access_lists = match &args.config {
        Some(path) => AccessLists::from_file(path)
            .with_context(|| format!("loading access lists from {}", path.display()))?,
        None => AccessLists::builtin(),
    };

    let config = ProxyConfig {
        bind_addr: args.bind,
        upstreams: args.upstream,
        upstream_kind: args.mode,
        upstream_timeout: Duration::from_millis(args.timeout_ms),
        access_lists,
        cache_dir: args.cache_dir.unwrap_or_else(std::env::temp_dir),
        max_inflight: args.max_inflight.max(1),
        refresh_interval: (args.refresh_secs > 0).then(|| Duration::from_secs(args.refresh_secs)),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(proxy::run(config))?;

    Ok(())
}
