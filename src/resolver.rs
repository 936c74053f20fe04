//! DNS query resolution logic.
//!
//! Handles the core query processing pipeline:
//! 1. Blacklist check (sinkhole ads/trackers)
//! 2. Response cache lookup
//! 3. Forward to upstream and cache the answer
//!
//! Transports handle the actual I/O, the resolver handles decisions.

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::ResponseCache;
use crate::dns::DnsMessage;
use crate::error::QueryError;
use crate::filter::BlacklistCache;
use crate::stats::{Stats, StatsSnapshot};
use crate::upstream::Upstream;

/// Outcome of a handled query, carrying the bytes to send back.
#[derive(Debug)]
pub enum QueryAction {
    /// Domain is blacklisted, answered with a null address.
    Blocked { response: Vec<u8>, domain: String },
    /// Answered from the response cache.
    Cached { response: Vec<u8>, domain: String },
    /// Answered by upstream; `response` is the upstream reply verbatim.
    Forwarded {
        response: Vec<u8>,
        domain: String,
        answer: DnsMessage,
        upstream_time: Duration,
    },
}

impl QueryAction {
    pub fn response(&self) -> &[u8] {
        match self {
            QueryAction::Blocked { response, .. }
            | QueryAction::Cached { response, .. }
            | QueryAction::Forwarded { response, .. } => response,
        }
    }

    pub fn domain(&self) -> &str {
        match self {
            QueryAction::Blocked { domain, .. }
            | QueryAction::Cached { domain, .. }
            | QueryAction::Forwarded { domain, .. } => domain,
        }
    }
}

/// Resolver handles DNS query processing decisions.
///
/// Shared by every query task. The blacklist is swapped as a whole on
/// refresh, so a lookup never sees a half-built list.
pub struct Resolver {
    blacklist: ArcSwap<BlacklistCache>,
    cache: ResponseCache,
    upstream: Arc<dyn Upstream>,
    stats: Stats,
}

impl Resolver {
    /// Create a resolver over a loaded (sorted) blacklist.
    pub fn new(blacklist: BlacklistCache, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            blacklist: ArcSwap::from_pointee(blacklist),
            cache: ResponseCache::new(),
            upstream,
            stats: Stats::new(),
        }
    }

    /// Decode a raw client packet and run it through the pipeline.
    ///
    /// On error nothing should be sent to the client.
    pub async fn handle(&self, packet: &[u8]) -> Result<QueryAction, QueryError> {
        let query = DnsMessage::decode(packet).map_err(QueryError::Decode)?;
        self.process_query(&query).await
    }

    /// Run the pipeline for one decoded query.
    pub async fn process_query(&self, query: &DnsMessage) -> Result<QueryAction, QueryError> {
        let domain = query.domain().to_string();

        // Step 1: Check blacklist
        if self.blacklist.load().contains(&domain) {
            let response = DnsMessage::mock_answer(query.id(), query.question.clone())
                .encode()
                .map_err(QueryError::Encode)?;
            return Ok(QueryAction::Blocked { response, domain });
        }

        // Step 2: Check cache
        let key = query.question_key();
        if let Some(records) = self.cache.get(&key) {
            let response = DnsMessage::answer(query.id(), query.question.clone(), records)
                .encode()
                .map_err(QueryError::Encode)?;
            return Ok(QueryAction::Cached { response, domain });
        }

        // Step 3: Forward to upstream
        let started = Instant::now();
        let response = self.upstream.resolve(query).await?;
        let upstream_time = started.elapsed();

        // Step 4: Cache the answer for as long as its longest-lived record
        let answer = DnsMessage::decode(&response).map_err(QueryError::UpstreamResponse)?;
        let ttl = answer.effective_ttl();
        if ttl > 0 {
            self.cache.put_with_ttl(key, answer.answers.clone(), ttl);
        }

        Ok(QueryAction::Forwarded {
            response,
            domain,
            answer,
            upstream_time,
        })
    }

    /// Publish a freshly loaded blacklist.
    pub fn replace_blacklist(&self, blacklist: BlacklistCache) {
        self.blacklist.store(Arc::new(blacklist));
    }

    /// Returns the number of domains in the blacklist.
    pub fn blocked_count(&self) -> usize {
        self.blacklist.load().len()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn stats_snapshot_and_reset(&self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }

    pub fn protocol_name(&self) -> &'static str {
        self.upstream.protocol_name()
    }
}
