//! Monotonic Time Source
//!
//! The cache consults a monotonic nanosecond clock for expiration checks and
//! latency recording. The clock is injected at construction so tests can drive
//! virtual time instead of sleeping.
//!
//! Two implementations are provided:
//!
//! - [`MonotonicClock`]: the default. Reads `std::time::Instant` relative to a
//!   fixed origin and keeps the latest reading cached in an atomic, so the
//!   reported time never moves backwards across threads.
//! - [`ManualClock`]: a virtual clock advanced explicitly by tests.
//!
//! # Examples
//!
//! ```
//! use balios::clock::{Clock, ManualClock};
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! assert_eq!(clock.now_nanos(), 0);
//! clock.advance(Duration::from_millis(5));
//! assert_eq!(clock.now_nanos(), 5_000_000);
//! ```

use core::fmt::Debug;
use core::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A monotonic nanosecond time source.
///
/// Implementations must be cheap to call and non-decreasing: for any two
/// sequenced calls, the second reading is greater than or equal to the first.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current time in nanoseconds since the clock's origin.
    fn now_nanos(&self) -> u64;
}

/// The default clock: `Instant`-based, with the latest reading cached.
///
/// The origin is the moment of construction, so readings start near zero and
/// an expiration deadline of `0` can serve as the "no TTL" sentinel.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
    /// Latest reading handed out, in nanoseconds. Never decreases.
    recent: AtomicU64,
}

impl MonotonicClock {
    /// Creates a clock anchored at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            recent: AtomicU64::new(1),
        }
    }

    /// Returns the most recent reading without consulting the OS clock.
    ///
    /// Suitable for coarse checks where staleness up to the last `now_nanos`
    /// call on any thread is acceptable.
    #[inline]
    pub fn recent_nanos(&self) -> u64 {
        self.recent.load(Ordering::Relaxed)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_nanos(&self) -> u64 {
        // Start at 1 so that 0 stays reserved as the "no deadline" sentinel.
        let raw = self.origin.elapsed().as_nanos() as u64 | 1;
        let prev = self.recent.fetch_max(raw, Ordering::Relaxed);
        raw.max(prev)
    }
}

/// A virtual clock for tests, advanced explicitly.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(by.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Sets the clock to an absolute nanosecond value.
    pub fn set(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_nanos(&self) -> u64 {
        self.nanos.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_never_decreases() {
        let clock = MonotonicClock::new();
        let mut last = 0;
        for _ in 0..1000 {
            let now = clock.now_nanos();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_monotonic_clock_recent_tracks_now() {
        let clock = MonotonicClock::new();
        let now = clock.now_nanos();
        assert!(clock.recent_nanos() >= now);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_nanos(), 0);
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now_nanos(), 1_000_000_000);
        clock.advance(Duration::from_nanos(5));
        assert_eq!(clock.now_nanos(), 1_000_000_005);
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::new();
        clock.set(42);
        assert_eq!(clock.now_nanos(), 42);
    }
}
