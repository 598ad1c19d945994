#![doc = include_str!("../README.md")]
//!
//! ---
//!
//! # Architecture
//!
//! The engine is six cooperating components, leaf-first:
//!
//! | Component | Module | Responsibility |
//! |-----------|--------|----------------|
//! | Time source | [`clock`] | Monotonic nanoseconds for expiry and latency |
//! | Frequency sketch | `sketch` (internal) | Popularity estimates for admission |
//! | Hash index | `index` (internal) | Key to slot mapping, bounded probing |
//! | Segment manager | `segment` (internal) | Window/Probation/Protected ordering |
//! | Admission gate | `admission` (internal) | Candidate vs. incumbent decisions |
//! | Single-flight | [`singleflight`] | Miss coalescing and cancellation |
//!
//! [`cache::BaliosCache`] wires them together behind the public operations.
//!
//! # Concurrency model
//!
//! Any number of threads may invoke any operation. Reads probe the index
//! without blocking and verify matches under a per-slot guard; structural
//! writes serialize on one policy mutex plus the touched slot. The only
//! blocking point is a single-flight waiter parked on a completion handle.
//! Per key, readers always observe either the pre-update or the post-update
//! value; across keys there is no snapshot atomicity.

/// Monotonic time sources, injectable for tests.
pub mod clock;

/// Construction configuration and validation.
pub mod config;

/// The cache entry type binding a key, value, and bookkeeping.
pub mod entry;

/// The error taxonomy surfaced at the cache boundary.
pub mod error;

/// The metrics sink contract and counter snapshots.
pub mod metrics;

/// Single-flight load coalescing and cancellation tokens.
pub mod singleflight;

/// The Window-TinyLFU cache itself.
pub mod cache;

mod admission;
mod index;
mod segment;
mod sketch;

pub use cache::BaliosCache;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::CacheConfig;
pub use entry::CacheEntry;
pub use error::{CacheError, ErrorKind, LoaderError};
pub use metrics::{CacheStats, MetricsSink, NoopMetrics};
pub use singleflight::CancelToken;
