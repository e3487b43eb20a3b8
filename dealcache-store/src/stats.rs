//! Cache counters and statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters updated by lookups and producer calls.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    cancellations: AtomicU64,
}

impl Counters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cancellation(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fill(&self, stats: &mut CacheStats) {
        stats.hits = self.hits.load(Ordering::Relaxed);
        stats.misses = self.misses.load(Ordering::Relaxed);
        stats.fetches = self.fetches.load(Ordering::Relaxed);
        stats.successes = self.successes.load(Ordering::Relaxed);
        stats.failures = self.failures.load(Ordering::Relaxed);
        stats.cancellations = self.cancellations.load(Ordering::Relaxed);
    }
}

/// Cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries in the map, fresh or not
    pub total_entries: usize,
    /// Entries that would be served without fetching
    pub fresh_entries: usize,
    /// Expired entries still held in the map
    pub stale_entries: usize,
    /// Observations served from a fresh entry
    pub hits: u64,
    /// Observations that had to fetch
    pub misses: u64,
    /// Producer invocations started
    pub fetches: u64,
    /// Producer invocations whose result was applied
    pub successes: u64,
    /// Producer invocations that failed with a genuine error
    pub failures: u64,
    /// Producer invocations superseded or torn down
    pub cancellations: u64,
}

impl CacheStats {
    /// Hit rate in `0.0..=1.0`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.hits = 3;
        stats.misses = 1;
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_counters_fill() {
        let counters = Counters::default();
        counters.hit();
        counters.miss();
        counters.miss();
        counters.fetch();
        counters.cancellation();

        let mut stats = CacheStats::default();
        counters.fill(&mut stats);

        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.cancellations, 1);
        assert_eq!(stats.failures, 0);
    }
}
