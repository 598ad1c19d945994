//! Frequency Sketch
//!
//! A Count-Min-style estimator of recent access frequency, feeding the
//! TinyLFU admission gate. Four rows of small saturating counters are packed
//! into a shared array of 64-bit words; a query returns the minimum of the
//! four row counters, which bounds collision-induced overestimation.
//!
//! # Layout
//!
//! With the default 4-bit counters, each word packs 16 counters:
//!
//! ```text
//! word:  [c15][c14][c13][c12][c11][c10][c9][c8][c7][c6][c5][c4][c3][c2][c1][c0]
//!          4    4    4    4    4    4   4   4   4   4   4   4   4   4   4   4  bits
//! ```
//!
//! Each row derives its word index from the hash mixed with an independent
//! seed, and its counter position within the word from a different byte of
//! the hash. Counter width is configurable from 1 to 8 bits; the saturation
//! ceiling is `2^bits - 1`.
//!
//! # Aging
//!
//! A global tick counter tracks increments. When it reaches
//! `10 × max_size`, every counter is halved in one pass. Halving preserves
//! the relative ordering of frequencies while bounding saturation, so the
//! sketch keeps discriminating between hot and cold keys over time.
//!
//! # Concurrency
//!
//! Increments are compare-and-swap loops on the packed word, so concurrent
//! increments on the same word are never lost. The halving pass uses plain
//! stores and may race with concurrent increments; the resulting counters are
//! eventually consistent, which the admission gate tolerates because it
//! re-samples at decision time.

use core::sync::atomic::{AtomicU64, Ordering};

/// Number of rows. Four balances accuracy and cost.
const DEPTH: usize = 4;

/// A mixture of seeds from FNV-1a, CityHash, and Murmur3 constants, one per
/// row, so the rows index the word array independently.
const SEEDS: [u64; DEPTH] = [
    0xc3a5_c85c_97cb_3127,
    0xb492_b66f_be98_f273,
    0x9ae1_6a3b_2f90_404f,
    0xcbf2_9ce4_8422_2325,
];

/// A probabilistic frequency estimator over 64-bit key hashes.
pub(crate) struct FrequencySketch {
    table: Box<[AtomicU64]>,
    word_mask: usize,
    counter_bits: u32,
    counter_max: u64,
    counters_per_word: usize,
    /// Clears the top bit of every counter field; `(word >> 1) & halve_mask`
    /// halves all counters in one step.
    halve_mask: u64,
    /// Increments since the last halving.
    ticks: AtomicU64,
    /// Halve all counters once ticks reach this.
    aging_threshold: u64,
}

impl FrequencySketch {
    /// Creates a sketch sized for a cache of `max_size` entries with counters
    /// of `counter_bits` width (1 to 8).
    pub(crate) fn new(max_size: usize, counter_bits: u8) -> Self {
        debug_assert!((1..=8).contains(&counter_bits));
        let bits = u32::from(counter_bits);
        let counter_max = (1u64 << bits) - 1;
        let counters_per_word = (64 / bits) as usize;

        let words = max_size.next_power_of_two().max(8);
        let table = (0..words).map(|_| AtomicU64::new(0)).collect();

        let mut halve_mask = 0u64;
        for field in 0..counters_per_word {
            halve_mask |= (counter_max >> 1) << (field as u32 * bits);
        }

        Self {
            table,
            word_mask: words - 1,
            counter_bits: bits,
            counter_max,
            counters_per_word,
            halve_mask,
            ticks: AtomicU64::new(0),
            aging_threshold: (max_size as u64).saturating_mul(10).max(10),
        }
    }

    /// Maximum value a counter can hold.
    #[cfg(test)]
    pub(crate) fn counter_max(&self) -> u64 {
        self.counter_max
    }

    /// Bumps the counter in every row at the column derived from `hash`,
    /// saturating at the ceiling, then advances the aging tick counter.
    pub(crate) fn increment(&self, hash: u64) {
        for row in 0..DEPTH {
            let word = self.word_of(hash, row);
            let shift = self.shift_of(hash, row);
            self.increment_at(word, shift);
        }

        let ticks = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if ticks >= self.aging_threshold
            && self
                .ticks
                .compare_exchange(ticks, 0, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            self.age();
        }
    }

    /// Returns the estimated frequency of `hash`: the minimum of the four row
    /// counters, in `[0, counter_max]`.
    pub(crate) fn estimate(&self, hash: u64) -> u64 {
        let mut freq = self.counter_max;
        for row in 0..DEPTH {
            let word = self.word_of(hash, row);
            let shift = self.shift_of(hash, row);
            let count = (self.table[word].load(Ordering::Relaxed) >> shift) & self.counter_max;
            freq = freq.min(count);
        }
        freq
    }

    /// Saturating add of 1 to the counter at `shift` within `word`.
    /// The CAS loop keeps concurrent increments on the word lossless.
    fn increment_at(&self, word: usize, shift: u32) {
        let cell = &self.table[word];
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            if (current >> shift) & self.counter_max == self.counter_max {
                return; // saturated
            }
            match cell.compare_exchange_weak(
                current,
                current + (1u64 << shift),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Halves every counter in place.
    ///
    /// Concurrent increments during the pass may be absorbed by the halving;
    /// the loss is bounded to one pass and keeps relative ordering intact.
    pub(crate) fn age(&self) {
        for cell in self.table.iter() {
            let current = cell.load(Ordering::Relaxed);
            cell.store((current >> 1) & self.halve_mask, Ordering::Relaxed);
        }
    }

    #[inline]
    fn word_of(&self, hash: u64, row: usize) -> usize {
        let mut mixed = hash.wrapping_add(SEEDS[row]).wrapping_mul(SEEDS[row]);
        mixed = mixed.wrapping_add(mixed >> 32);
        (mixed as usize) & self.word_mask
    }

    #[inline]
    fn shift_of(&self, hash: u64, row: usize) -> u32 {
        let field = ((hash >> (16 + 8 * row)) as usize) % self.counters_per_word;
        field as u32 * self.counter_bits
    }

    /// Sum of every counter in the sketch.
    #[cfg(test)]
    fn counter_sum(&self) -> u64 {
        let mut sum = 0;
        for cell in self.table.iter() {
            let word = cell.load(Ordering::Relaxed);
            for field in 0..self.counters_per_word {
                sum += (word >> (field as u32 * self.counter_bits)) & self.counter_max;
            }
        }
        sum
    }
}

impl core::fmt::Debug for FrequencySketch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FrequencySketch")
            .field("words", &self.table.len())
            .field("counter_bits", &self.counter_bits)
            .field("aging_threshold", &self.aging_threshold)
            .finish()
    }
}
