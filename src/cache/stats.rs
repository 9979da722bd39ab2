//! Cache Statistics Module
//!
//! Tracks lookup hits and misses and the size of the cached working set.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from memory
    pub hits: u64,
    /// Lookups that fell through to the filesystem
    pub misses: u64,
    /// Assets published into the cache (replacements included)
    pub stores: u64,
    /// Distinct cached assets
    pub total_entries: usize,
    /// Bytes held by distinct cached assets
    pub total_bytes: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Counters ==
/// Lock-free counters updated by concurrent readers.
#[derive(Debug, Default)]
pub struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
}

impl StatsCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store(&self) {
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    /// Combines the counters with the current map size.
    pub fn snapshot(&self, total_entries: usize, total_bytes: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            total_entries,
            total_bytes,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let counters = StatsCounters::default();
        counters.record_hit();
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();
        let stats = counters.snapshot(1, 10);
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_snapshot() {
        let counters = StatsCounters::default();
        counters.record_store();
        counters.record_miss();
        assert_eq!(
            counters.snapshot(1, 42),
            CacheStats {
                hits: 0,
                misses: 1,
                stores: 1,
                total_entries: 1,
                total_bytes: 42,
            }
        );
    }

    #[test]
    fn test_stats_serialize() {
        let stats = StatsCounters::default().snapshot(2, 100);
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"total_entries\":2"));
        assert!(json.contains("\"total_bytes\":100"));
    }
}
