//! Window-TinyLFU Cache
//!
//! The glue layer wiring the engine together: the hash index stores entries,
//! the segment manager orders them into Window, Probation, and Protected
//! regions, the frequency sketch estimates popularity, and the admission gate
//! arbitrates between candidates and incumbents under capacity pressure.
//! Misses can be filled through the single-flight loader so a stampede of
//! identical misses invokes the backing load at most once.
//!
//! # Read path
//!
//! `get` probes the index without blocking, verifies the match under the
//! slot's guard, feeds the sketch, and applies the segment recency bump only
//! if the policy mutex is free. An entry whose deadline has passed is treated
//! as a miss and removed; once expired, its value is never observed again.
//!
//! # Write path
//!
//! `set` classifies the key: resident keys update in place; new keys enter
//! the Window. At full capacity the incoming key is gated against the
//! nominated victim first, so a cold key cannot displace a proven incumbent.
//! Window overflow migrates the window's least-recently-inserted entry into
//! the main region through the same gate. A full index probe window evicts
//! its least-frequent occupant.
//!
//! Counter semantics: `admissions` counts entries entering the main region,
//! `rejections` counts keys and candidates the gate turned away, `evictions`
//! counts policy-driven removals of resident entries. The metrics sink sees
//! `record_eviction` for every resident entry removed by policy, including
//! rejected window candidates.

use crate::admission::AdmissionGate;
use crate::clock::{Clock, MonotonicClock};
use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::error::{CacheError, LoaderError};
use crate::index::{HashIndex, Lookup};
use crate::metrics::{CacheStats, MetricsSink, NoopMetrics, StatCounters};
use crate::segment::SegmentManager;
use crate::singleflight::{CancelToken, FlightGroup, FlightRole};
use crate::sketch::FrequencySketch;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::sync::atomic::{AtomicBool, Ordering};
use hashbrown::DefaultHashBuilder;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// A concurrent Window-TinyLFU cache.
///
/// All operations are thread-safe; share the cache across threads behind an
/// `Arc`. Values are returned by clone, so `V` should be a cheap handle such
/// as `Arc<T>` for large payloads.
///
/// # Examples
///
/// ```
/// use balios::{BaliosCache, CacheConfig};
///
/// let cache: BaliosCache<String, i32> =
///     BaliosCache::init(CacheConfig::new(1_000), None).unwrap();
///
/// assert!(cache.set("answer".to_string(), 42));
/// assert_eq!(cache.get("answer"), Some(42));
/// assert!(cache.delete("answer"));
/// assert_eq!(cache.get("answer"), None);
/// ```
pub struct BaliosCache<K, V, S = DefaultHashBuilder> {
    config: CacheConfig,
    hash_builder: S,
    clock: Arc<dyn Clock>,
    sketch: FrequencySketch,
    index: HashIndex<K, V>,
    policy: Mutex<SegmentManager>,
    gate: AdmissionGate,
    flights: FlightGroup<K, V, S>,
    stats: StatCounters,
    sink: Arc<dyn MetricsSink>,
    closed: AtomicBool,
}

impl<K, V> BaliosCache<K, V, DefaultHashBuilder>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
{
    /// Creates a cache from a validated configuration.
    ///
    /// Pass a sink to receive latency and lifecycle observations; `None`
    /// discards them. Configuration problems surface as `invalid-config`.
    pub fn init(
        config: CacheConfig,
        sink: Option<Arc<dyn MetricsSink>>,
    ) -> Result<Self, CacheError> {
        Self::with_parts(
            config,
            sink,
            Arc::new(MonotonicClock::new()),
            DefaultHashBuilder::default(),
        )
    }

    /// Creates a cache driven by an injected clock, for tests that need
    /// virtual time.
    pub fn with_clock(
        config: CacheConfig,
        sink: Option<Arc<dyn MetricsSink>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        Self::with_parts(config, sink, clock, DefaultHashBuilder::default())
    }
}

impl<K, V, S> BaliosCache<K, V, S>
where
    K: Hash + Eq + Clone + Send,
    V: Clone + Send,
    S: BuildHasher + Clone,
{
    /// Creates a cache from explicit parts: configuration, sink, clock, and
    /// hash builder.
    pub fn with_parts(
        config: CacheConfig,
        sink: Option<Arc<dyn MetricsSink>>,
        clock: Arc<dyn Clock>,
        hash_builder: S,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        let index = HashIndex::new(config.max_size());
        let policy = SegmentManager::new(
            index.slot_count(),
            config.window_capacity(),
            config.probation_capacity(),
            config.protected_capacity(),
        );
        Ok(Self {
            sketch: FrequencySketch::new(config.max_size(), config.counter_bits()),
            gate: AdmissionGate::new(config.tie_admit_probability()),
            flights: FlightGroup::with_hasher(hash_builder.clone()),
            stats: StatCounters::default(),
            sink: sink.unwrap_or_else(|| Arc::new(NoopMetrics)),
            closed: AtomicBool::new(false),
            policy: Mutex::new(policy),
            index,
            config,
            hash_builder,
            clock,
        })
    }

    /// Returns a clone of the value for `key`, if resident and unexpired.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get_with(key, V::clone)
    }

    /// Applies `f` to the value for `key` under the slot guard, avoiding a
    /// clone when only a projection of the value is needed.
    pub fn get_with<Q, F, R>(&self, key: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        F: FnOnce(&V) -> R,
    {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let start = self.clock.now_nanos();
        let hash = self.hash_builder.hash_one(key);
        self.sketch.increment(hash);

        match self.index.read_with(hash, key, start, f) {
            Lookup::Hit(result, idx) => {
                self.stats.record_hit();
                // Best-effort recency bump; the gate re-samples frequencies
                // at decision time, so a skipped bump is not a correctness
                // problem.
                if let Some(mut policy) = self.policy.try_lock() {
                    policy.on_hit(idx);
                }
                self.sink.record_get(self.elapsed_since(start), true);
                Some(result)
            }
            Lookup::Expired(idx) => {
                self.remove_expired(idx, start);
                self.stats.record_miss();
                self.sink.record_get(self.elapsed_since(start), false);
                None
            }
            Lookup::Miss => {
                self.stats.record_miss();
                self.sink.record_get(self.elapsed_since(start), false);
                None
            }
        }
    }

    /// Inserts or updates `key`, applying the configured default TTL.
    ///
    /// Returns whether the entry is resident afterwards: the admission gate
    /// may turn a new key away at capacity, and a window candidate it
    /// displaces may lose its seat during rebalancing.
    pub fn set(&self, key: K, value: V) -> bool {
        self.set_with_ttl(key, value, self.config.default_ttl())
    }

    /// Inserts or updates `key` with an explicit TTL; `Duration::ZERO` means
    /// the entry does not expire.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let start = self.clock.now_nanos();
        let hash = self.hash_builder.hash_one(&key);
        self.sketch.increment(hash);
        let expire_at = if ttl.is_zero() {
            0
        } else {
            start.saturating_add(ttl.as_nanos() as u64)
        };

        let mut policy = self.policy.lock();

        if let Some(idx) = self.index.find(hash, &key) {
            if self.index.update_value(idx, value.clone(), expire_at) {
                policy.on_hit(idx);
                drop(policy);
                self.sink.record_set(self.elapsed_since(start));
                return true;
            }
        }

        // At capacity the incoming key itself faces the gate before any slot
        // is touched; a rejected key is dropped, not stored.
        if policy.is_full() {
            let Some(victim) = policy.victim() else {
                drop(policy);
                self.sink.record_set(self.elapsed_since(start));
                return false;
            };
            if !self.gate.admit(&self.sketch, hash, self.index.hash_of(victim)) {
                self.stats.record_rejection();
                drop(policy);
                self.sink.record_set(self.elapsed_since(start));
                return false;
            }
        }

        let idx = match self.index.vacant(hash) {
            Some(idx) => idx,
            None => {
                // Probe window full: the sketch picks the occupant to evict.
                let Some(displaced) = self.min_frequency_occupant(hash) else {
                    self.stats.record_rejection();
                    drop(policy);
                    self.sink.record_set(self.elapsed_since(start));
                    return false;
                };
                self.evict(&mut policy, displaced);
                displaced
            }
        };

        self.index
            .install(idx, CacheEntry::new(key, hash, value, expire_at));
        policy.push_window(idx);
        let accepted = self.rebalance(&mut policy, idx);
        drop(policy);
        self.sink.record_set(self.elapsed_since(start));
        accepted
    }

    /// Inserts or updates `key` like [`set`](Self::set), reporting the
    /// outcome as an error value instead of a flag.
    ///
    /// A new key the admission gate turns away at capacity surfaces as
    /// `cache-full-admission-rejected`, which is marked retryable: once the
    /// key's sketch frequency grows past the incumbent's, a retry is
    /// admitted.
    pub fn try_set(&self, key: K, value: V) -> Result<(), CacheError> {
        self.try_set_with_ttl(key, value, self.config.default_ttl())
    }

    /// Like [`try_set`](Self::try_set) with an explicit TTL;
    /// `Duration::ZERO` means the entry does not expire.
    pub fn try_set_with_ttl(&self, key: K, value: V, ttl: Duration) -> Result<(), CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::internal("cache is closed").with_context("state", "closed"));
        }
        if self.set_with_ttl(key, value, ttl) {
            Ok(())
        } else {
            Err(CacheError::admission_rejected()
                .with_context("capacity", self.config.max_size().to_string()))
        }
    }

    /// Removes `key`, returning whether it was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let start = self.clock.now_nanos();
        let hash = self.hash_builder.hash_one(key);

        let mut policy = self.policy.lock();
        let existed = match self.index.find(hash, key) {
            Some(idx) => {
                let _ = self.index.take(idx);
                policy.remove(idx);
                true
            }
            None => false,
        };
        drop(policy);
        self.sink.record_delete(self.elapsed_since(start));
        existed
    }

    /// Returns the value for `key`, running `loader` on a miss.
    ///
    /// Concurrent calls for the same key coalesce: the loader runs at most
    /// once per in-flight key and every caller observes the same outcome.
    /// A successful load is inserted before the flight completes, so later
    /// arrivals see a hit. Loader errors surface as `loader-failed`, except
    /// that a [`CacheError`] returned by the loader (such as
    /// [`CacheError::key_not_found`] when the backing store has no value)
    /// propagates to every caller unchanged. A panicking loader is recovered
    /// and surfaces as `loader-trapped`.
    pub fn get_or_load<F>(&self, key: K, loader: F) -> Result<V, CacheError>
    where
        F: FnOnce() -> Result<V, LoaderError>,
    {
        self.load_inner(key, loader, None)
    }

    /// Like [`get_or_load`](Self::get_or_load), but the waiter gives up with
    /// `loader-cancelled` when `token` fires. The shared load itself keeps
    /// running; a token held by the thread that runs the loader has no
    /// effect on it.
    pub fn get_or_load_with_cancellation<F>(
        &self,
        key: K,
        loader: F,
        token: &CancelToken,
    ) -> Result<V, CacheError>
    where
        F: FnOnce() -> Result<V, LoaderError>,
    {
        self.load_inner(key, loader, Some(token))
    }

    fn load_inner<F>(
        &self,
        key: K,
        loader: F,
        token: Option<&CancelToken>,
    ) -> Result<V, CacheError>
    where
        F: FnOnce() -> Result<V, LoaderError>,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::internal("cache is closed").with_context("state", "closed"));
        }
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        match self.flights.begin(key.clone()) {
            FlightRole::Leader(flight) => {
                let outcome = match catch_unwind(AssertUnwindSafe(loader)) {
                    Ok(Ok(value)) => {
                        self.set(key.clone(), value.clone());
                        Ok(value)
                    }
                    Ok(Err(cause)) => Err(match cause.downcast::<CacheError>() {
                        Ok(error) => *error,
                        Err(cause) => CacheError::loader_failed(cause),
                    }),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        log::error!("loader panicked during single-flight load: {message}");
                        Err(CacheError::loader_trapped(message))
                    }
                };
                flight.publish(outcome.clone());
                self.flights.finish(&key);
                outcome
            }
            FlightRole::Follower(flight) => flight.wait(token),
        }
    }

    /// A point-in-time snapshot of the cache's counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.len())
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.policy.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured total entry capacity.
    pub fn capacity(&self) -> usize {
        self.config.max_size()
    }

    /// Releases internal resources. In-flight waiters are failed with an
    /// `internal` error; subsequent operations fail fast (reads miss, writes
    /// return `false`, loader paths error).
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.flights
            .fail_all(CacheError::internal("cache is closed").with_context("state", "closed"));
        let mut policy = self.policy.lock();
        self.index.clear_all();
        policy.clear();
    }

    /// Restores the capacity and window invariants after an insertion.
    /// Returns whether the just-inserted slot kept its seat.
    ///
    /// While the cache is over capacity, the window's least-recently-inserted
    /// entry is the candidate and the main-region LRU the incumbent; the gate
    /// picks the one to keep and the loser leaves. Once capacity holds, any
    /// remaining window overflow spills into probation, which is guaranteed
    /// to have room at that point.
    fn rebalance(&self, policy: &mut SegmentManager, inserted: usize) -> bool {
        let mut survived = true;
        while policy.len() > policy.capacity() {
            let Some(candidate) = policy.pop_window_lru() else {
                break;
            };
            let candidate_hash = self.index.hash_of(candidate);
            match policy.victim() {
                Some(incumbent)
                    if self.gate.admit(
                        &self.sketch,
                        candidate_hash,
                        self.index.hash_of(incumbent),
                    ) =>
                {
                    self.evict(policy, incumbent);
                    policy.admit_probation(candidate);
                    self.stats.record_admission();
                }
                _ => {
                    let _ = self.index.take(candidate);
                    self.sink.record_eviction();
                    self.stats.record_rejection();
                    if candidate == inserted {
                        survived = false;
                    }
                }
            }
        }
        while policy.window_over_cap() {
            let Some(candidate) = policy.pop_window_lru() else {
                break;
            };
            if policy.main_has_room() {
                policy.admit_probation(candidate);
                self.stats.record_admission();
            } else {
                // Unreachable while capacity holds, but a dropped candidate
                // is the safe answer if it ever is not.
                let _ = self.index.take(candidate);
                self.sink.record_eviction();
                self.stats.record_rejection();
                if candidate == inserted {
                    survived = false;
                }
            }
        }
        survived
    }

    /// Removes a resident entry chosen by the replacement policy.
    fn evict(&self, policy: &mut SegmentManager, idx: usize) {
        let _ = self.index.take(idx);
        policy.remove(idx);
        self.stats.record_eviction();
        self.sink.record_eviction();
    }

    /// Lazily removes an entry whose deadline has passed.
    fn remove_expired(&self, idx: usize, now: u64) {
        let mut policy = self.policy.lock();
        if self.index.take_if_expired(idx, now) {
            policy.remove(idx);
            self.stats.record_expiration();
            self.sink.record_expiration();
        }
    }

    /// The occupant of the probe window for `hash` with the lowest sketch
    /// estimate.
    fn min_frequency_occupant(&self, hash: u64) -> Option<usize> {
        let (occupants, len) = self.index.occupants(hash);
        occupants[..len]
            .iter()
            .copied()
            .min_by_key(|&idx| self.sketch.estimate(self.index.hash_of(idx)))
    }

    #[inline]
    fn elapsed_since(&self, start: u64) -> u64 {
        self.clock.now_nanos().saturating_sub(start)
    }
}

/// Extracts a readable message from a recovered panic payload.
fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "loader panicked".to_string()
    }
}

impl<K, V, S> fmt::Debug for BaliosCache<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaliosCache")
            .field("config", &self.config)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
