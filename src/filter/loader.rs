//! Concurrent blacklist loading.

use futures::future::join_all;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::blacklist::BlacklistCache;
use super::extract::extract_domains;
use super::source::{SourceFetcher, SourceStore};
use crate::config::{AccessLists, Source};
use crate::dns::canonical_domain;
use crate::error::SourceFetchError;

/// Builds a [`BlacklistCache`] from access lists.
pub struct BlacklistLoader {
    fetcher: Arc<dyn SourceFetcher>,
    store: SourceStore,
}

impl BlacklistLoader {
    pub fn new(fetcher: Arc<dyn SourceFetcher>, store: SourceStore) -> Self {
        Self { fetcher, store }
    }

    /// Load every source concurrently, merge the static blacklist and sort.
    ///
    /// A failing source is logged and contributes nothing. The returned cache
    /// is sorted and ready for lookups.
    pub async fn load(&self, lists: &AccessLists) -> BlacklistCache {
        let start = Instant::now();
        let whitelist: FxHashSet<String> =
            lists.whitelist.iter().map(|d| canonical_domain(d)).collect();
        let cache = BlacklistCache::new();

        join_all(
            lists
                .sources
                .iter()
                .map(|source| self.load_source(source, &cache, &whitelist)),
        )
        .await;

        cache.extend(
            lists
                .blacklist
                .iter()
                .map(|d| canonical_domain(d))
                .filter(|d| !whitelist.contains(d)),
        );

        // Only after every source has finished appending
        cache.sort();

        info!(
            domains = cache.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Blacklist loaded"
        );
        cache
    }

    async fn load_source(
        &self,
        source: &Source,
        cache: &BlacklistCache,
        whitelist: &FxHashSet<String>,
    ) {
        match self.source_domains(source).await {
            Ok(domains) => {
                let domains: Vec<String> = domains
                    .into_iter()
                    .filter(|d| !whitelist.contains(d))
                    .collect();
                info!(source = %source.url, domains = domains.len(), "Blacklist source loaded");
                cache.extend(domains);
            }
            Err(e) => {
                warn!(source = %source.url, error = %e, "Skipping blacklist source");
            }
        }
    }

    async fn source_domains(&self, source: &Source) -> Result<Vec<String>, SourceFetchError> {
        let stored = self.store.read(&source.url).await;

        if let (Some(hash_url), Some(stored)) = (&source.hash_url, &stored) {
            match self.fetcher.fetch_hash(hash_url).await {
                Ok(remote) if remote.eq_ignore_ascii_case(&stored.hash) => {
                    debug!(source = %source.url, "Blacklist source unchanged, using local copy");
                    return Ok(extract_domains(&stored.body, source.format));
                }
                Ok(_) => debug!(source = %source.url, "Blacklist source changed"),
                Err(e) => {
                    warn!(source = %source.url, error = %e, "Hash check failed, refetching");
                }
            }
        }

        info!(source = %source.url, "Fetching blacklist source");
        let body = self.fetcher.fetch_text(&source.url).await?;
        if let Err(e) = self.store.write(&source.url, &body).await {
            warn!(source = %source.url, error = %e, "Failed to store blacklist copy");
        }

        Ok(extract_domains(&body, source.format))
    }
}
