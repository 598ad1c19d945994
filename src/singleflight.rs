//! Single-Flight Load Coalescing
//!
//! When many threads miss on the same key at once, only one of them should
//! pay for the load. The in-flight table maps each key being loaded to a
//! one-shot completion handle; the thread that creates the handle runs the
//! loader, every other thread waits on the handle, and all of them observe
//! the same published result. The handle is removed in every outcome
//! (success, loader error, recovered panic), so a later miss starts a fresh
//! flight.
//!
//! # Protocol
//!
//! 1. On miss, atomically insert a handle keyed by the requested key; if one
//!    already exists, become a waiter on it.
//! 2. The inserting thread runs the loader.
//! 3. The result (value or error) is published through the handle and all
//!    waiters are released.
//! 4. On success the value is inserted into the cache *before* the handle is
//!    removed, so later arrivals see a hit instead of starting a new flight.
//!
//! # Cancellation
//!
//! A [`CancelToken`] affects only the waiter carrying it: the waiter wakes
//! with a `loader-cancelled` error while the shared load keeps running for
//! everyone else. Deadline tokens are observed exactly; a manual `cancel()`
//! without a deadline is observed within one poll tick.

use crate::error::CacheError;
use core::hash::{BuildHasher, Hash};
use core::sync::atomic::{AtomicBool, Ordering};
use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often a waiter re-checks a flag-only token while blocked.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Cancellation signal for a single-flight waiter.
///
/// Clones share the same flag, so a token handed to a waiter can be cancelled
/// from another thread. A token may carry a deadline, a manual flag, or both.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Creates a token cancelled only by an explicit [`cancel`](Self::cancel).
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Creates a token that cancels itself after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Cancels the token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether the token has been cancelled or its deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// The next instant a blocked waiter should wake to re-check this token.
    fn next_wake(&self) -> Instant {
        match self.deadline {
            Some(deadline) => deadline.min(Instant::now() + CANCEL_POLL_INTERVAL),
            None => Instant::now() + CANCEL_POLL_INTERVAL,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

enum FlightState<V> {
    Pending,
    Done(Result<V, CacheError>),
}

/// A one-shot completion handle shared by one runner and its waiters.
pub(crate) struct Flight<V> {
    state: Mutex<FlightState<V>>,
    completed: Condvar,
}

impl<V: Clone> Flight<V> {
    fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Pending),
            completed: Condvar::new(),
        }
    }

    /// Publishes the outcome and releases every waiter.
    pub(crate) fn publish(&self, result: Result<V, CacheError>) {
        *self.state.lock() = FlightState::Done(result);
        self.completed.notify_all();
    }

    /// Blocks until the outcome is published or the token fires.
    pub(crate) fn wait(&self, token: Option<&CancelToken>) -> Result<V, CacheError> {
        let mut state = self.state.lock();
        loop {
            if let FlightState::Done(result) = &*state {
                return result.clone();
            }
            match token {
                Some(token) => {
                    if token.is_cancelled() {
                        return Err(CacheError::loader_cancelled());
                    }
                    let _ = self.completed.wait_until(&mut state, token.next_wake());
                }
                None => self.completed.wait(&mut state),
            }
        }
    }
}

impl<V> core::fmt::Debug for Flight<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Flight").finish_non_exhaustive()
    }
}

/// The role this thread plays in a flight.
pub(crate) enum FlightRole<V> {
    /// This thread created the handle and must run the loader.
    Leader(Arc<Flight<V>>),
    /// Another thread is already loading; wait on its handle.
    Follower(Arc<Flight<V>>),
}

/// The per-key in-flight table.
pub(crate) struct FlightGroup<K, V, S> {
    inflight: Mutex<HashMap<K, Arc<Flight<V>>, S>>,
}

impl<K: Hash + Eq, V: Clone, S: BuildHasher> FlightGroup<K, V, S> {
    pub(crate) fn with_hasher(hasher: S) -> Self {
        Self {
            inflight: Mutex::new(HashMap::with_hasher(hasher)),
        }
    }

    /// Joins or creates the flight for `key`.
    pub(crate) fn begin(&self, key: K) -> FlightRole<V> {
        let mut inflight = self.inflight.lock();
        match inflight.get(&key) {
            Some(flight) => FlightRole::Follower(Arc::clone(flight)),
            None => {
                let flight = Arc::new(Flight::new());
                inflight.insert(key, Arc::clone(&flight));
                FlightRole::Leader(flight)
            }
        }
    }

    /// Removes the handle for `key` after its outcome is published.
    pub(crate) fn finish(&self, key: &K) {
        self.inflight.lock().remove(key);
    }

    /// Fails every pending flight and empties the table.
    pub(crate) fn fail_all(&self, error: CacheError) {
        let drained: Vec<_> = self.inflight.lock().drain().collect();
        for (_, flight) in drained {
            flight.publish(Err(error.clone()));
        }
    }
}

impl<K, V, S> core::fmt::Debug for FlightGroup<K, V, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlightGroup").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use hashbrown::DefaultHashBuilder;
    use std::thread;

    fn group() -> FlightGroup<String, i32, DefaultHashBuilder> {
        FlightGroup::with_hasher(DefaultHashBuilder::default())
    }

    #[test]
    fn test_first_caller_leads_rest_follow() {
        let flights = group();
        let FlightRole::Leader(leader) = flights.begin("k".to_string()) else {
            panic!("first caller must lead");
        };
        assert!(matches!(
            flights.begin("k".to_string()),
            FlightRole::Follower(_)
        ));
        leader.publish(Ok(7));
        flights.finish(&"k".to_string());
        assert!(matches!(flights.begin("k".to_string()), FlightRole::Leader(_)));
    }

    #[test]
    fn test_waiters_observe_published_value() {
        let flights = Arc::new(group());
        let FlightRole::Leader(leader) = flights.begin("k".to_string()) else {
            panic!("expected leader");
        };
        let follower_flights = Arc::clone(&flights);
        let waiter = thread::spawn(move || {
            let FlightRole::Follower(flight) = follower_flights.begin("k".to_string()) else {
                panic!("expected follower");
            };
            flight.wait(None)
        });
        thread::sleep(Duration::from_millis(20));
        leader.publish(Ok(42));
        assert_eq!(waiter.join().unwrap().unwrap(), 42);
    }

    #[test]
    fn test_deadline_token_cancels_waiter() {
        let flights = group();
        let FlightRole::Leader(_leader) = flights.begin("k".to_string()) else {
            panic!("expected leader");
        };
        let FlightRole::Follower(flight) = flights.begin("k".to_string()) else {
            panic!("expected follower");
        };
        let token = CancelToken::with_timeout(Duration::from_millis(10));
        let started = Instant::now();
        let result = flight.wait(Some(&token));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::LoaderCancelled);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_manual_cancel_wakes_waiter() {
        let flights = group();
        let FlightRole::Leader(_leader) = flights.begin("k".to_string()) else {
            panic!("expected leader");
        };
        let FlightRole::Follower(flight) = flights.begin("k".to_string()) else {
            panic!("expected follower");
        };
        let token = CancelToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(15));
            canceller.cancel();
        });
        let result = flight.wait(Some(&token));
        assert_eq!(result.unwrap_err().kind(), ErrorKind::LoaderCancelled);
        handle.join().unwrap();
    }

    #[test]
    fn test_fail_all_releases_waiters() {
        let flights = Arc::new(group());
        let FlightRole::Leader(_leader) = flights.begin("k".to_string()) else {
            panic!("expected leader");
        };
        let follower_flights = Arc::clone(&flights);
        let waiter = thread::spawn(move || {
            let FlightRole::Follower(flight) = follower_flights.begin("k".to_string()) else {
                panic!("expected follower");
            };
            flight.wait(None)
        });
        thread::sleep(Duration::from_millis(20));
        flights.fail_all(CacheError::internal("cache is closed"));
        assert_eq!(waiter.join().unwrap().unwrap_err().kind(), ErrorKind::Internal);
    }
}
