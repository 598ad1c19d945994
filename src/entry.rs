//! Cache Entry Type
//!
//! An entry binds one key to one value together with the bookkeeping the
//! engine needs: the key's precomputed 64-bit hash, a per-slot monotonic
//! version, and an absolute expiration deadline in monotonic nanoseconds.
//!
//! # Invariants
//!
//! - The stored hash always matches the key (it is computed once at insertion
//!   and reused by the index, the sketch, and the admission gate).
//! - `version` is strictly monotonic per slot: every in-place update bumps it.
//! - `expire_at == 0` is the sentinel for "no TTL".
//!
//! Entries live inside index slots and are only observed under the slot's
//! guard; validity is slot occupancy, so no separate flag is stored here.

use core::fmt;

/// A single cached key/value binding with engine bookkeeping.
pub struct CacheEntry<K, V> {
    /// The cached key.
    pub key: K,

    /// Precomputed 64-bit hash of the key.
    pub hash: u64,

    /// The cached value (use a cheap-to-clone handle such as `Arc<T>` for
    /// large payloads).
    pub value: V,

    /// Update generation of the slot holding this entry. Starts at 1 and
    /// increments on every in-place value update.
    pub version: u64,

    /// Absolute expiration deadline in monotonic nanoseconds; 0 means no TTL.
    pub expire_at: u64,
}

impl<K, V> CacheEntry<K, V> {
    /// Creates a fresh entry at version 1.
    #[inline]
    pub fn new(key: K, hash: u64, value: V, expire_at: u64) -> Self {
        Self {
            key,
            hash,
            value,
            version: 1,
            expire_at,
        }
    }

    /// Returns `true` if the entry carries a deadline and it has passed.
    #[inline]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expire_at != 0 && self.expire_at <= now
    }

    /// Replaces the value and deadline in place, bumping the version.
    #[inline]
    pub fn update(&mut self, value: V, expire_at: u64) {
        self.value = value;
        self.expire_at = expire_at;
        self.version += 1;
    }
}

impl<K: Clone, V: Clone> Clone for CacheEntry<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            hash: self.hash,
            value: self.value.clone(),
            version: self.version,
            expire_at: self.expire_at,
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for CacheEntry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("hash", &self.hash)
            .field("value", &self.value)
            .field("version", &self.version)
            .field("expire_at", &self.expire_at)
            .finish()
    }
}
