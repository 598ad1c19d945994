//! Concurrent Correctness Tests
//!
//! These tests validate that the cache maintains its invariants while being
//! accessed from multiple threads.
//!
//! ## Test Strategy
//!
//! - **No torn reads**: a reader racing writers on one key must observe a
//!   complete pre-update or post-update value, never a hybrid.
//! - **Capacity under contention**: the configured bound holds at every
//!   quiescent point, whatever the interleaving.
//! - **Liveness**: mixed get/set/delete traffic completes without deadlock.

use balios::{BaliosCache, CacheConfig};
use scoped_threadpool::Pool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

// ============================================================================
// SEGMENT 1: SINGLE-KEY ATOMICITY
// ============================================================================

#[test]
fn test_no_torn_reads_on_contended_key() {
    let cache: Arc<BaliosCache<String, String>> =
        Arc::new(BaliosCache::init(CacheConfig::new(100), None).unwrap());
    let value_a = "A".repeat(512);
    let value_b = "B".repeat(512);
    cache.set("contended".to_string(), value_a.clone());

    let stop = Arc::new(AtomicBool::new(false));
    thread::scope(|scope| {
        for writer in 0..2 {
            let cache = Arc::clone(&cache);
            let stop = Arc::clone(&stop);
            let value_a = value_a.clone();
            let value_b = value_b.clone();
            scope.spawn(move || {
                let mut flip = writer == 0;
                while !stop.load(Ordering::Relaxed) {
                    let value = if flip { value_a.clone() } else { value_b.clone() };
                    cache.set("contended".to_string(), value);
                    flip = !flip;
                }
            });
        }
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            let value_a = value_a.clone();
            let value_b = value_b.clone();
            scope.spawn(move || {
                for _ in 0..20_000 {
                    if let Some(observed) = cache.get("contended") {
                        assert!(
                            observed == value_a || observed == value_b,
                            "torn read: {} chars starting {:?}",
                            observed.len(),
                            &observed[..8.min(observed.len())]
                        );
                    }
                }
            });
        }
        thread::sleep(std::time::Duration::from_millis(100));
        stop.store(true, Ordering::Relaxed);
    });
}

#[test]
fn test_readers_never_observe_deleted_then_stale_value() {
    let cache: Arc<BaliosCache<String, u64>> =
        Arc::new(BaliosCache::init(CacheConfig::new(100), None).unwrap());

    thread::scope(|scope| {
        let writer_cache = Arc::clone(&cache);
        scope.spawn(move || {
            for generation in 0..5_000u64 {
                writer_cache.set("k".to_string(), generation);
                if generation % 7 == 0 {
                    writer_cache.delete("k");
                }
            }
        });
        let reader_cache = Arc::clone(&cache);
        scope.spawn(move || {
            let mut last_seen = 0u64;
            for _ in 0..5_000 {
                if let Some(generation) = reader_cache.get("k") {
                    // Generations only move forward; a decrease would mean a
                    // stale entry resurfaced.
                    assert!(generation >= last_seen, "{generation} < {last_seen}");
                    last_seen = generation;
                }
            }
        });
    });
}

// ============================================================================
// SEGMENT 2: CAPACITY UNDER CONTENTION
// ============================================================================

#[test]
fn test_capacity_bound_under_concurrent_inserts() {
    let cache: Arc<BaliosCache<String, usize>> =
        Arc::new(BaliosCache::init(CacheConfig::new(500), None).unwrap());

    thread::scope(|scope| {
        for thread_id in 0..8 {
            let cache = Arc::clone(&cache);
            scope.spawn(move || {
                for i in 0..2_000 {
                    cache.set(format!("t{thread_id}-k{i}"), i);
                }
            });
        }
    });

    assert!(
        cache.len() <= 500,
        "capacity exceeded: {} > 500",
        cache.len()
    );
    let stats = cache.stats();
    assert_eq!(stats.size, cache.len());
    assert!(stats.evictions + stats.rejections > 0);
}

#[test]
fn test_mixed_workload_with_thread_pool() {
    let cache: Arc<BaliosCache<String, usize>> =
        Arc::new(BaliosCache::init(CacheConfig::new(256), None).unwrap());
    let mut pool = Pool::new(8);

    pool.scoped(|scope| {
        for worker in 0..8usize {
            let cache = Arc::clone(&cache);
            scope.execute(move || {
                for i in 0..4_000usize {
                    let key = format!("k{}", (worker * 31 + i * 7) % 512);
                    match i % 4 {
                        0 | 1 => {
                            cache.set(key, i);
                        }
                        2 => {
                            let _ = cache.get(&key);
                        }
                        _ => {
                            cache.delete(&key);
                        }
                    }
                }
            });
        }
    });

    assert!(cache.len() <= 256);
    let stats = cache.stats();
    assert!(stats.hits + stats.misses > 0);
}

// ============================================================================
// SEGMENT 3: CONCURRENT READ PATHS
// ============================================================================

#[test]
fn test_concurrent_hits_on_shared_working_set() {
    let cache: Arc<BaliosCache<u32, u32>> =
        Arc::new(BaliosCache::init(CacheConfig::new(1_000), None).unwrap());
    for key in 0..500u32 {
        cache.set(key, key * 2);
    }

    thread::scope(|scope| {
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            scope.spawn(move || {
                for round in 0..10 {
                    for key in 0..500u32 {
                        if let Some(value) = cache.get(&key) {
                            assert_eq!(value, key * 2, "round {round}");
                        }
                    }
                }
            });
        }
    });

    let stats = cache.stats();
    assert!(stats.hits > 0);
}

#[test]
fn test_close_while_reading_does_not_panic() {
    let cache: Arc<BaliosCache<u32, u32>> =
        Arc::new(BaliosCache::init(CacheConfig::new(100), None).unwrap());
    for key in 0..100u32 {
        cache.set(key, key);
    }

    thread::scope(|scope| {
        for _ in 0..4 {
            let cache = Arc::clone(&cache);
            scope.spawn(move || {
                for key in 0..10_000u32 {
                    let _ = cache.get(&(key % 100));
                }
            });
        }
        let closer = Arc::clone(&cache);
        scope.spawn(move || {
            thread::sleep(std::time::Duration::from_millis(5));
            closer.close();
        });
    });

    assert!(cache.is_empty());
    assert_eq!(cache.get(&1), None);
}
