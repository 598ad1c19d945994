//! Admission Gate
//!
//! The TinyLFU gate decides, under capacity pressure, whether a candidate key
//! should displace the nominated incumbent. It compares the frequency sketch's
//! estimates for the two hashes:
//!
//! 1. Candidate estimate greater than the incumbent's: admit.
//! 2. Candidate estimate lower: reject.
//! 3. Equal: admit with a small jitter probability (default 1/128), which
//!    keeps new-but-equally-hot keys from starving forever behind an
//!    incumbent they can never beat.
//!
//! Favoring long-run frequency over short-run recency is what protects the
//! main region from scan pollution: a burst of one-shot keys estimates near
//! zero and loses to any incumbent with history.

use crate::sketch::FrequencySketch;
use core::sync::atomic::{AtomicU64, Ordering};

/// TinyLFU admission decisions with configurable tie jitter.
pub(crate) struct AdmissionGate {
    /// Admit a tie when the next RNG draw falls below this threshold.
    tie_threshold: u64,
    /// xorshift64* state; races on the tie path only skew the draw, which the
    /// jitter tolerates.
    rng: AtomicU64,
}

impl AdmissionGate {
    /// Creates a gate admitting ties with the given probability in `[0, 1)`.
    pub(crate) fn new(tie_admit_probability: f64) -> Self {
        Self {
            tie_threshold: (tie_admit_probability * u64::MAX as f64) as u64,
            rng: AtomicU64::new(0x9e37_79b9_7f4a_7c15),
        }
    }

    /// Returns `true` if the candidate should replace the incumbent.
    pub(crate) fn admit(
        &self,
        sketch: &FrequencySketch,
        candidate_hash: u64,
        incumbent_hash: u64,
    ) -> bool {
        let candidate = sketch.estimate(candidate_hash);
        let incumbent = sketch.estimate(incumbent_hash);
        if candidate > incumbent {
            return true;
        }
        if candidate < incumbent {
            return false;
        }
        self.next_draw() < self.tie_threshold
    }

    fn next_draw(&self) -> u64 {
        let mut x = self.rng.load(Ordering::Relaxed);
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng.store(x, Ordering::Relaxed);
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }
}

impl core::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("tie_threshold", &self.tie_threshold)
            .finish()
    }
}
