//! Statistics tracking for the proxy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic counters updated by query tasks and drained by the stats logger.
pub struct Stats {
    pub requests: AtomicU64,
    pub forwarded: AtomicU64,
    pub cached: AtomicU64,
    pub blocked: AtomicU64,
    /// Malformed packets and packets refused by the admission limit.
    pub dropped: AtomicU64,
    /// Queries that failed upstream or while encoding.
    pub failed: AtomicU64,
    /// Cumulative response time in microseconds for averaging.
    total_response_time_us: AtomicU64,
    started: Instant,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record_forwarded(&self, response_time_ms: f64) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        self.record_answered(response_time_ms);
    }

    pub fn record_cached(&self, response_time_ms: f64) {
        self.cached.fetch_add(1, Ordering::Relaxed);
        self.record_answered(response_time_ms);
    }

    pub fn record_blocked(&self, response_time_ms: f64) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
        self.record_answered(response_time_ms);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_answered(&self, response_time_ms: f64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add((response_time_ms * 1000.0) as u64, Ordering::Relaxed);
    }

    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let requests = self.requests.swap(0, Ordering::Relaxed);
        let forwarded = self.forwarded.swap(0, Ordering::Relaxed);
        let cached = self.cached.swap(0, Ordering::Relaxed);
        let blocked = self.blocked.swap(0, Ordering::Relaxed);
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        let failed = self.failed.swap(0, Ordering::Relaxed);
        let total_us = self.total_response_time_us.swap(0, Ordering::Relaxed);

        let answered = requests - failed.min(requests);
        let avg_response_ms = if answered > 0 {
            (total_us as f64 / answered as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            requests,
            forwarded,
            cached,
            blocked,
            dropped,
            failed,
            avg_response_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub forwarded: u64,
    pub cached: u64,
    pub blocked: u64,
    pub dropped: u64,
    pub failed: u64,
    pub avg_response_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_averages_answered_queries() {
        let stats = Stats::new();
        stats.record_blocked(1.0);
        stats.record_cached(2.0);
        stats.record_forwarded(6.0);
        stats.record_failed();
        stats.record_dropped();

        let snapshot = stats.snapshot_and_reset();

        assert_eq!(snapshot.requests, 4);
        assert_eq!(snapshot.blocked, 1);
        assert_eq!(snapshot.cached, 1);
        assert_eq!(snapshot.forwarded, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.dropped, 1);
        assert!((snapshot.avg_response_ms - 3.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_resets_counters() {
        let stats = Stats::new();
        stats.record_forwarded(5.0);

        stats.snapshot_and_reset();
        let snapshot = stats.snapshot_and_reset();

        assert_eq!(snapshot.requests, 0);
        assert_eq!(snapshot.avg_response_ms, 0.0);
    }
}
