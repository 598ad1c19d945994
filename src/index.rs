//! Hash Index
//!
//! An open-addressed table mapping key hashes to slots, sized at
//! `2 × max_size` rounded up to the next power of two so indices derive from
//! a bitmask. Collisions use bounded linear probing with a fixed cap of
//! [`PROBE_LIMIT`] slots; when a probe window fills up, the caller evicts the
//! window's least-frequent occupant (the sketch breaks ties) instead of
//! probing further, which bounds the worst-case cost of every operation and
//! keeps the access pattern cache-line friendly.
//!
//! # Per-slot concurrency protocol
//!
//! Each slot carries a sequence word following the seqlock discipline:
//! writers make it odd before publishing and even after, so the word is
//! strictly monotonic and doubles as the slot's update version. Readers use
//! it as a lock-free prefilter over the occupancy marker and stored hash;
//! a reader that observes interference beyond a small retry bound treats the
//! slot as a mismatch and moves on, so lookups never block on probing.
//!
//! The entry cell itself is a per-slot `parking_lot::Mutex`. Values are
//! cloneable handles, and a handle cannot be duplicated concurrently with its
//! destruction under a pure seqlock, so the cell is read under the slot lock
//! (a single CAS when uncontended). Writers serialize per slot; distinct
//! slots proceed in parallel. Every reader observes either the pre-update or
//! the post-update entry, never a torn hybrid.
//!
//! All 64-bit slot fields are atomics and therefore 8-byte aligned; slots are
//! padded to a cache line.

use crate::entry::CacheEntry;
use core::borrow::Borrow;
use core::hash::Hash;
use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use parking_lot::Mutex;

/// Maximum number of slots examined per probe.
pub(crate) const PROBE_LIMIT: usize = 8;

/// Seqlock interference retries before a slot is treated as a mismatch.
const SEQ_RETRY_LIMIT: usize = 4;

const STATE_EMPTY: u8 = 0;
const STATE_OCCUPIED: u8 = 1;

/// Outcome of a probing read.
pub(crate) enum Lookup<R> {
    /// A live entry matched; carries the mapped result and the slot index.
    Hit(R, usize),
    /// The key matched but its deadline has passed; carries the slot index
    /// so the caller can remove it.
    Expired(usize),
    /// No live entry for the key in the probe window.
    Miss,
}

/// One fixed-position cell of the table.
#[repr(align(64))]
struct Slot<K, V> {
    /// Seqlock word: odd while a writer is publishing, strictly monotonic.
    seq: AtomicU64,
    /// Hash of the occupying key; meaningful only while occupied.
    hash: AtomicU64,
    /// Occupancy marker.
    state: AtomicU8,
    /// The entry cell.
    data: Mutex<Option<CacheEntry<K, V>>>,
}

impl<K, V> Slot<K, V> {
    fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            hash: AtomicU64::new(0),
            state: AtomicU8::new(STATE_EMPTY),
            data: Mutex::new(None),
        }
    }

    /// Seqlock read of (state, hash). Returns `None` on persistent
    /// interference, which callers treat as a mismatch.
    fn read_marker(&self) -> Option<(u8, u64)> {
        for _ in 0..SEQ_RETRY_LIMIT {
            let begin = self.seq.load(Ordering::Acquire);
            if begin & 1 == 1 {
                core::hint::spin_loop();
                continue;
            }
            let state = self.state.load(Ordering::Acquire);
            let hash = self.hash.load(Ordering::Acquire);
            if self.seq.load(Ordering::Acquire) == begin {
                return Some((state, hash));
            }
        }
        None
    }

    #[inline]
    fn write_begin(&self) {
        self.seq.fetch_add(1, Ordering::Release);
    }

    #[inline]
    fn write_end(&self) {
        self.seq.fetch_add(1, Ordering::Release);
    }
}

/// The open-addressed slot table.
pub(crate) struct HashIndex<K, V> {
    slots: Box<[Slot<K, V>]>,
    mask: usize,
}

impl<K: Hash + Eq, V> HashIndex<K, V> {
    /// Creates a table of `2 × max_size` slots rounded up to a power of two.
    pub(crate) fn new(max_size: usize) -> Self {
        let slot_count = (max_size * 2).next_power_of_two();
        let slots = (0..slot_count).map(|_| Slot::new()).collect();
        Self {
            slots,
            mask: slot_count - 1,
        }
    }

    /// Number of slots in the table.
    #[inline]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Hash of the key occupying `idx` (0 when empty).
    #[inline]
    pub(crate) fn hash_of(&self, idx: usize) -> u64 {
        self.slots[idx].hash.load(Ordering::Acquire)
    }

    #[inline]
    fn probe(&self, hash: u64) -> impl Iterator<Item = usize> + '_ {
        let start = hash as usize & self.mask;
        (0..PROBE_LIMIT).map(move |j| (start + j) & self.mask)
    }

    /// Probes for `key`, applying `f` to the live value under the slot lock.
    ///
    /// Never blocks on non-matching slots; a slot whose marker matches is
    /// verified (and read) under its lock.
    pub(crate) fn read_with<Q, R>(
        &self,
        hash: u64,
        key: &Q,
        now: u64,
        f: impl FnOnce(&V) -> R,
    ) -> Lookup<R>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let mut f = Some(f);
        for idx in self.probe(hash) {
            let slot = &self.slots[idx];
            match slot.read_marker() {
                Some((STATE_OCCUPIED, stored)) if stored == hash => {}
                _ => continue,
            }
            let guard = slot.data.lock();
            if let Some(entry) = guard.as_ref() {
                if entry.hash == hash && entry.key.borrow() == key {
                    if entry.is_expired(now) {
                        return Lookup::Expired(idx);
                    }
                    if let Some(read) = f.take() {
                        return Lookup::Hit(read(&entry.value), idx);
                    }
                }
            }
        }
        Lookup::Miss
    }

    /// Finds the slot holding `key`, expired or not.
    pub(crate) fn find<Q>(&self, hash: u64, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        for idx in self.probe(hash) {
            let slot = &self.slots[idx];
            match slot.read_marker() {
                Some((STATE_OCCUPIED, stored)) if stored == hash => {}
                _ => continue,
            }
            let guard = slot.data.lock();
            if let Some(entry) = guard.as_ref() {
                if entry.hash == hash && entry.key.borrow() == key {
                    return Some(idx);
                }
            }
        }
        None
    }

    /// First empty slot in the probe window for `hash`.
    pub(crate) fn vacant(&self, hash: u64) -> Option<usize> {
        self.probe(hash).find(|&idx| {
            matches!(self.slots[idx].read_marker(), Some((STATE_EMPTY, _)))
        })
    }

    /// Collects the occupied slots of the probe window for `hash`.
    pub(crate) fn occupants(&self, hash: u64) -> ([usize; PROBE_LIMIT], usize) {
        let mut out = [0usize; PROBE_LIMIT];
        let mut len = 0;
        for idx in self.probe(hash) {
            if matches!(self.slots[idx].read_marker(), Some((STATE_OCCUPIED, _))) {
                out[len] = idx;
                len += 1;
            }
        }
        (out, len)
    }

    /// Publishes `entry` into the empty slot `idx`.
    pub(crate) fn install(&self, idx: usize, entry: CacheEntry<K, V>) {
        let slot = &self.slots[idx];
        let mut guard = slot.data.lock();
        slot.write_begin();
        slot.hash.store(entry.hash, Ordering::Release);
        slot.state.store(STATE_OCCUPIED, Ordering::Release);
        *guard = Some(entry);
        slot.write_end();
    }

    /// Replaces the value of the live entry at `idx` in place, bumping the
    /// entry version. Returns `false` if the slot turned out to be empty.
    pub(crate) fn update_value(&self, idx: usize, value: V, expire_at: u64) -> bool {
        let slot = &self.slots[idx];
        let mut guard = slot.data.lock();
        match guard.as_mut() {
            Some(entry) => {
                slot.write_begin();
                entry.update(value, expire_at);
                slot.write_end();
                true
            }
            None => false,
        }
    }

    /// Clears slot `idx`, returning the displaced entry if any.
    pub(crate) fn take(&self, idx: usize) -> Option<CacheEntry<K, V>> {
        let slot = &self.slots[idx];
        let mut guard = slot.data.lock();
        slot.write_begin();
        slot.state.store(STATE_EMPTY, Ordering::Release);
        slot.hash.store(0, Ordering::Release);
        let entry = guard.take();
        slot.write_end();
        entry
    }

    /// Clears slot `idx` only if its entry's deadline has passed.
    pub(crate) fn take_if_expired(&self, idx: usize, now: u64) -> bool {
        let slot = &self.slots[idx];
        let mut guard = slot.data.lock();
        match guard.as_ref() {
            Some(entry) if entry.is_expired(now) => {
                slot.write_begin();
                slot.state.store(STATE_EMPTY, Ordering::Release);
                slot.hash.store(0, Ordering::Release);
                *guard = None;
                slot.write_end();
                true
            }
            _ => false,
        }
    }

    /// Clears every slot.
    pub(crate) fn clear_all(&self) {
        for idx in 0..self.slots.len() {
            let _ = self.take(idx);
        }
    }
}

impl<K, V> core::fmt::Debug for HashIndex<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashIndex")
            .field("slots", &self.slots.len())
            .finish()
    }
}
