//! Cache Configuration
//!
//! The cache is created from a [`CacheConfig`]: required capacity plus fluent
//! setters for the tunables. Validation happens once, at construction, and
//! rejects bad configurations with an `invalid-config` error carrying the
//! offending field in its context map.
//!
//! # Capacity layout
//!
//! `max_size` is split into three regions:
//!
//! ```text
//! max_size = window + probation + protected
//!   window    = max(1, round(max_size × window_ratio))        (default ~1%)
//!   protected = round((max_size - window) × protected_ratio)  (default 80%)
//!   probation = max_size - window - protected
//! ```
//!
//! # Examples
//!
//! ```
//! use balios::config::CacheConfig;
//! use std::time::Duration;
//!
//! let config = CacheConfig::new(10_000)
//!     .with_default_ttl(Duration::from_secs(60))
//!     .with_window_ratio(0.02);
//!
//! assert_eq!(config.max_size(), 10_000);
//! assert_eq!(config.window_capacity(), 200);
//! ```

use crate::error::CacheError;
use std::time::Duration;

/// Default fraction of capacity given to the admission window.
pub const DEFAULT_WINDOW_RATIO: f64 = 0.01;

/// Default fraction of the main region given to the protected segment.
pub const DEFAULT_PROTECTED_RATIO: f64 = 0.80;

/// Default counter width of the frequency sketch, in bits.
pub const DEFAULT_COUNTER_BITS: u8 = 4;

/// Default probability of admitting a candidate whose frequency estimate ties
/// the incumbent's. Empirically tuned; see the admission gate docs.
pub const DEFAULT_TIE_ADMIT_PROBABILITY: f64 = 1.0 / 128.0;

/// Construction configuration for a [`BaliosCache`](crate::BaliosCache).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    max_size: usize,
    window_ratio: f64,
    protected_ratio: f64,
    counter_bits: u8,
    default_ttl: Duration,
    tie_admit_probability: f64,
}

impl CacheConfig {
    /// Creates a configuration with the given total entry capacity and the
    /// default tunables.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            window_ratio: DEFAULT_WINDOW_RATIO,
            protected_ratio: DEFAULT_PROTECTED_RATIO,
            counter_bits: DEFAULT_COUNTER_BITS,
            default_ttl: Duration::ZERO,
            tie_admit_probability: DEFAULT_TIE_ADMIT_PROBABILITY,
        }
    }

    /// Sets the fraction of capacity reserved for the admission window.
    /// Must lie in `(0, 1)`.
    pub fn with_window_ratio(mut self, ratio: f64) -> Self {
        self.window_ratio = ratio;
        self
    }

    /// Sets the fraction of the main region reserved for the protected
    /// segment. Must lie in `[0, 1]`.
    pub fn with_protected_ratio(mut self, ratio: f64) -> Self {
        self.protected_ratio = ratio;
        self
    }

    /// Sets the counter width of the frequency sketch, 1 to 8 bits.
    pub fn with_counter_bits(mut self, bits: u8) -> Self {
        self.counter_bits = bits;
        self
    }

    /// Sets the TTL applied by `set`; `Duration::ZERO` means entries do not
    /// expire unless `set_with_ttl` says otherwise.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the probability that the admission gate admits a candidate whose
    /// frequency estimate equals the incumbent's. Must lie in `[0, 1)`.
    pub fn with_tie_admit_probability(mut self, probability: f64) -> Self {
        self.tie_admit_probability = probability;
        self
    }

    /// Total entry capacity.
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Configured window fraction.
    #[inline]
    pub fn window_ratio(&self) -> f64 {
        self.window_ratio
    }

    /// Configured protected fraction of the main region.
    #[inline]
    pub fn protected_ratio(&self) -> f64 {
        self.protected_ratio
    }

    /// Configured sketch counter width in bits.
    #[inline]
    pub fn counter_bits(&self) -> u8 {
        self.counter_bits
    }

    /// TTL applied by `set`.
    #[inline]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Tie-break admission probability.
    #[inline]
    pub fn tie_admit_probability(&self) -> f64 {
        self.tie_admit_probability
    }

    /// Entry capacity of the admission window (at least 1).
    pub fn window_capacity(&self) -> usize {
        (((self.max_size as f64) * self.window_ratio).round() as usize)
            .max(1)
            .min(self.max_size)
    }

    /// Entry capacity of the protected segment.
    pub fn protected_capacity(&self) -> usize {
        let main = self.max_size - self.window_capacity();
        ((main as f64) * self.protected_ratio).round() as usize
    }

    /// Entry capacity of the probation segment.
    pub fn probation_capacity(&self) -> usize {
        self.max_size - self.window_capacity() - self.protected_capacity()
    }

    /// Validates the configuration, reporting the first offending field.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.max_size == 0 {
            return Err(CacheError::invalid_config("max_size must be positive")
                .with_context("field", "max_size")
                .with_context("value", "0"));
        }
        if !(self.window_ratio > 0.0 && self.window_ratio < 1.0) {
            return Err(
                CacheError::invalid_config("window_ratio must lie in (0, 1)")
                    .with_context("field", "window_ratio")
                    .with_context("value", self.window_ratio.to_string()),
            );
        }
        if !(0.0..=1.0).contains(&self.protected_ratio) {
            return Err(
                CacheError::invalid_config("protected_ratio must lie in [0, 1]")
                    .with_context("field", "protected_ratio")
                    .with_context("value", self.protected_ratio.to_string()),
            );
        }
        if !(1..=8).contains(&self.counter_bits) {
            return Err(
                CacheError::invalid_config("counter_bits must lie in 1..=8")
                    .with_context("field", "counter_bits")
                    .with_context("value", self.counter_bits.to_string()),
            );
        }
        if !(0.0..1.0).contains(&self.tie_admit_probability) {
            return Err(CacheError::invalid_config(
                "tie_admit_probability must lie in [0, 1)",
            )
            .with_context("field", "tie_admit_probability")
            .with_context("value", self.tie_admit_probability.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::new(10_000);
        assert_eq!(config.max_size(), 10_000);
        assert_eq!(config.counter_bits(), 4);
        assert_eq!(config.default_ttl(), Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capacity_split_sums_to_max() {
        for max in [1, 2, 3, 10, 100, 1_000, 12_345] {
            let config = CacheConfig::new(max);
            assert_eq!(
                config.window_capacity() + config.probation_capacity() + config.protected_capacity(),
                max,
                "split must partition max_size={max}"
            );
            assert!(config.window_capacity() >= 1);
        }
    }

    #[test]
    fn test_window_is_one_percent_by_default() {
        let config = CacheConfig::new(10_000);
        assert_eq!(config.window_capacity(), 100);
        assert_eq!(config.protected_capacity(), 7_920);
        assert_eq!(config.probation_capacity(), 1_980);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = CacheConfig::new(0).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert_eq!(err.context().get("field").map(String::as_str), Some("max_size"));
    }

    #[test]
    fn test_bad_window_ratio_rejected() {
        assert!(CacheConfig::new(10).with_window_ratio(0.0).validate().is_err());
        assert!(CacheConfig::new(10).with_window_ratio(1.0).validate().is_err());
        assert!(CacheConfig::new(10).with_window_ratio(-0.5).validate().is_err());
    }

    #[test]
    fn test_bad_counter_bits_rejected() {
        assert!(CacheConfig::new(10).with_counter_bits(0).validate().is_err());
        assert!(CacheConfig::new(10).with_counter_bits(9).validate().is_err());
        assert!(CacheConfig::new(10).with_counter_bits(8).validate().is_ok());
    }

    #[test]
    fn test_bad_tie_probability_rejected() {
        assert!(CacheConfig::new(10)
            .with_tie_admit_probability(1.0)
            .validate()
            .is_err());
        assert!(CacheConfig::new(10)
            .with_tie_admit_probability(0.0)
            .validate()
            .is_ok());
    }
}
