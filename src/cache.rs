//! DNS response cache with TTL-based expiration.

use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::trace;

use crate::dns::DnsRecord;

struct CacheEntry {
    records: Vec<DnsRecord>,
    /// Bumped on every write so a stale expiry never removes a newer entry.
    generation: u64,
}

#[derive(Default)]
struct Entries {
    map: FxHashMap<String, CacheEntry>,
    next_generation: u64,
}

/// TTL-based response cache.
///
/// Every insert arms its own expiry task which removes the entry once the TTL
/// elapses, whether or not it is read in between. A single lock guards the
/// whole map, the expiry task included.
#[derive(Clone, Default)]
pub struct ResponseCache {
    entries: Arc<Mutex<Entries>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the records cached under `key`.
    pub fn get(&self, key: &str) -> Option<Vec<DnsRecord>> {
        let Ok(entries) = self.entries.lock() else {
            return None;
        };
        entries.map.get(key).map(|entry| entry.records.clone())
    }

    /// Store `records` under `key` for `ttl_secs` seconds.
    ///
    /// A TTL of 0 is ignored. Must be called from within a tokio runtime.
    pub fn put_with_ttl(&self, key: String, records: Vec<DnsRecord>, ttl_secs: u32) {
        if ttl_secs == 0 {
            return;
        }

        let generation = {
            let Ok(mut entries) = self.entries.lock() else {
                return;
            };
            entries.next_generation += 1;
            let generation = entries.next_generation;
            entries.map.insert(
                key.clone(),
                CacheEntry {
                    records,
                    generation,
                },
            );
            generation
        };

        let entries = Arc::downgrade(&self.entries);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(u64::from(ttl_secs))).await;
            if let Some(entries) = entries.upgrade() {
                expire(&entries, &key, generation);
            }
        });
    }

    /// Remove the entry for `key`, if any.
    pub fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.map.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn expire(entries: &Mutex<Entries>, key: &str, generation: u64) {
    let Ok(mut entries) = entries.lock() else {
        return;
    };
    if entries
        .map
        .get(key)
        .is_some_and(|entry| entry.generation == generation)
    {
        entries.map.remove(key);
        trace!(key, "Cache entry expired");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn records(addr: [u8; 4], ttl: u32) -> Vec<DnsRecord> {
        vec![DnsRecord::a("example.com", ttl, Ipv4Addr::from(addr))]
    }

    #[tokio::test(start_paused = true)]
    async fn get_returns_fresh_entry() {
        let cache = ResponseCache::new();

        cache.put_with_ttl("example.com.:1:1".into(), records([1, 2, 3, 4], 300), 300);

        assert_eq!(
            cache.get("example.com.:1:1"),
            Some(records([1, 2, 3, 4], 300))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_after_ttl() {
        let cache = ResponseCache::new();
        cache.put_with_ttl("example.com.:1:1".into(), records([1, 2, 3, 4], 1), 1);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(cache.get("example.com.:1:1"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entry_survives_until_ttl() {
        let cache = ResponseCache::new();
        cache.put_with_ttl("example.com.:1:1".into(), records([1, 2, 3, 4], 5), 5);

        tokio::time::sleep(Duration::from_secs(4)).await;

        assert!(cache.get("example.com.:1:1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_expiry_keeps_newer_entry() {
        let cache = ResponseCache::new();
        cache.put_with_ttl("example.com.:1:1".into(), records([1, 1, 1, 1], 1), 1);
        cache.put_with_ttl("example.com.:1:1".into(), records([2, 2, 2, 2], 10), 10);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            cache.get("example.com.:1:1"),
            Some(records([2, 2, 2, 2], 10))
        );

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(cache.get("example.com.:1:1"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_is_not_cached() {
        let cache = ResponseCache::new();

        cache.put_with_ttl("example.com.:1:1".into(), records([1, 2, 3, 4], 0), 0);

        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_is_idempotent() {
        let cache = ResponseCache::new();
        cache.put_with_ttl("example.com.:1:1".into(), records([1, 2, 3, 4], 60), 60);

        cache.remove("example.com.:1:1");
        cache.remove("example.com.:1:1");
        cache.remove("missing.:1:1");

        assert!(cache.is_empty());
    }
}
