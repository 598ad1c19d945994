//! Cache Metrics
//!
//! Two surfaces live here:
//!
//! - [`MetricsSink`]: the narrow contract the core calls into. Implement it to
//!   bridge the cache into an observability stack; the core ships only
//!   [`NoopMetrics`]. Exporter adapters are external collaborators.
//! - [`CacheStats`]: the lock-free counter snapshot returned by
//!   [`stats`](crate::BaliosCache::stats).
//!
//! Counters are plain relaxed atomics: they are monotonic event counts, and a
//! snapshot taken while operations are in flight is allowed to be a moment
//! stale.

use core::sync::atomic::{AtomicU64, Ordering};

/// The contract the core reports into.
///
/// All methods are called on the hot path and must not block. Latencies are
/// monotonic nanoseconds measured by the cache's clock.
pub trait MetricsSink: Send + Sync {
    /// Records a completed `get`, with whether it hit.
    fn record_get(&self, latency_ns: u64, hit: bool);

    /// Records a completed `set`.
    fn record_set(&self, latency_ns: u64);

    /// Records a completed `delete`.
    fn record_delete(&self, latency_ns: u64);

    /// Records one entry evicted by the replacement policy.
    fn record_eviction(&self);

    /// Records one entry removed because its TTL passed.
    fn record_expiration(&self);
}

/// A sink that discards every observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    #[inline]
    fn record_get(&self, _latency_ns: u64, _hit: bool) {}
    #[inline]
    fn record_set(&self, _latency_ns: u64) {}
    #[inline]
    fn record_delete(&self, _latency_ns: u64) {}
    #[inline]
    fn record_eviction(&self) {}
    #[inline]
    fn record_expiration(&self) {}
}

/// A point-in-time snapshot of the cache's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that found a live entry.
    pub hits: u64,
    /// Reads that found nothing (including lazily expired entries).
    pub misses: u64,
    /// Entries removed by the replacement policy.
    pub evictions: u64,
    /// Entries admitted into the main region.
    pub admissions: u64,
    /// Candidates the admission gate turned away.
    pub rejections: u64,
    /// Entries removed because their TTL passed.
    pub expirations: u64,
    /// Entries currently resident.
    pub size: usize,
}

impl CacheStats {
    /// Hit rate in `[0, 1]`, or 0.0 before any reads.
    pub fn hit_rate(&self) -> f64 {
        let requests = self.hits + self.misses;
        if requests > 0 {
            self.hits as f64 / requests as f64
        } else {
            0.0
        }
    }
}

/// Internal atomic counters backing [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    admissions: AtomicU64,
    rejections: AtomicU64,
    expirations: AtomicU64,
}

impl StatCounters {
    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_admission(&self) {
        self.admissions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, size: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            admissions: self.admissions.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_roll_up_into_snapshot() {
        let counters = StatCounters::default();
        counters.record_hit();
        counters.record_hit();
        counters.record_miss();
        counters.record_eviction();
        counters.record_admission();
        counters.record_rejection();
        counters.record_expiration();

        let stats = counters.snapshot(5);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.admissions, 1);
        assert_eq!(stats.rejections, 1);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.size, 5);
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        stats.hits = 3;
        stats.misses = 1;
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_noop_sink_is_callable() {
        let sink = NoopMetrics;
        sink.record_get(10, true);
        sink.record_set(10);
        sink.record_delete(10);
        sink.record_eviction();
        sink.record_expiration();
    }
}
