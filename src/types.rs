//! Core time types used throughout the library
//!
//! # Key Types
//!
//! - **`Timestamp`**: An instant with nanosecond precision (signed nanoseconds since the UNIX epoch)
//! - **`TimeRange`**: Half-open query window `[begin, end)`
//!
//! The archive stores instants in a packed 64-bit format: the upper 36 bits
//! hold UNIX seconds and the lower 28 bits hold the fractional second in units
//! of 2^-28 s. `Timestamp::to_packed` / `Timestamp::from_packed` convert
//! between the two. The conversion is not always invertible at nanosecond
//! resolution because 2^-28 s does not divide evenly into nanoseconds.
//!
//! # Example
//!
//! ```rust
//! use pvhist::types::{TimeRange, Timestamp};
//!
//! let begin = Timestamp::from_secs(1_000);
//! let end = begin.plus_millis(60_000);
//! let range = TimeRange::new(begin, end).unwrap();
//!
//! assert!(range.contains(begin));
//! assert!(!range.contains(end)); // End is exclusive
//! assert_eq!(end.seconds_since(begin), 60.0);
//! ```

use crate::error::ConfigError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MILLI: i64 = 1_000_000;

/// Number of low bits holding the fractional second in the packed format
const PACKED_FRACTION_BITS: u32 = 28;

/// Mask selecting the fractional part of a packed timestamp
const PACKED_FRACTION_MASK: u64 = (1 << PACKED_FRACTION_BITS) - 1;

/// Packed fraction units (2^-28 s) to nanoseconds: 10^9 / 2^28
const PACKED_TO_NANOS: f64 = 3.725_290_298_461_914;

/// Nanoseconds to packed fraction units: 2^28 / 10^9
const NANOS_TO_PACKED: f64 = 0.268_435_456;

/// An instant in time with nanosecond precision
///
/// Stored as signed nanoseconds since the UNIX epoch, which covers roughly
/// the years 1677 through 2262.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The UNIX epoch
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Create a timestamp from nanoseconds since the epoch
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Create a timestamp from milliseconds since the epoch
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(NANOS_PER_MILLI))
    }

    /// Create a timestamp from whole seconds since the epoch
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(NANOS_PER_SECOND))
    }

    /// The current wall-clock time
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Nanoseconds since the epoch
    #[inline]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Milliseconds since the epoch (truncated toward negative infinity)
    #[inline]
    pub const fn as_millis(self) -> i64 {
        self.0.div_euclid(NANOS_PER_MILLI)
    }

    /// Seconds since the epoch including the fractional part
    #[inline]
    pub fn as_seconds_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SECOND as f64
    }

    /// Signed number of seconds from `earlier` to `self`
    ///
    /// The difference is taken in integer nanoseconds first, so the result
    /// does not depend on how far from the epoch both instants lie.
    #[inline]
    pub fn seconds_since(self, earlier: Timestamp) -> f64 {
        self.0.saturating_sub(earlier.0) as f64 / NANOS_PER_SECOND as f64
    }

    /// Shift by a (possibly negative) number of milliseconds
    pub fn plus_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis.saturating_mul(NANOS_PER_MILLI)))
    }

    /// Shift by a (possibly negative) number of nanoseconds
    pub fn plus_nanos(self, nanos: i64) -> Self {
        Self(self.0.saturating_add(nanos))
    }

    /// Convert from a chrono UTC datetime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let nanos = dt
            .timestamp()
            .saturating_mul(NANOS_PER_SECOND)
            .saturating_add(i64::from(dt.timestamp_subsec_nanos()));
        Self(nanos)
    }

    /// Convert to a chrono UTC datetime
    pub fn to_datetime(self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.0)
    }

    /// Convert to the archive's packed 64-bit representation
    pub fn to_packed(self) -> u64 {
        let secs = self.0.div_euclid(NANOS_PER_SECOND) as u64;
        let nanos = self.0.rem_euclid(NANOS_PER_SECOND) as f64;
        let fraction = (nanos * NANOS_TO_PACKED) as u64;
        (secs << PACKED_FRACTION_BITS) | (fraction & PACKED_FRACTION_MASK)
    }

    /// Convert from the archive's packed 64-bit representation
    pub fn from_packed(packed: u64) -> Self {
        let secs = (packed >> PACKED_FRACTION_BITS) as i64;
        let fraction = (packed & PACKED_FRACTION_MASK) as f64;
        let nanos = (fraction * PACKED_TO_NANOS) as i64;
        Self(secs.saturating_mul(NANOS_PER_SECOND).saturating_add(nanos))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%d %H:%M:%S%.6f"))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_datetime(dt)
    }
}

/// Half-open time window `[begin, end)` for interval queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start (inclusive)
    pub begin: Timestamp,

    /// End (exclusive)
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a new time range with validation
    ///
    /// Returns an error if `begin > end`. An empty range (`begin == end`)
    /// is allowed and simply contains nothing.
    pub fn new(begin: Timestamp, end: Timestamp) -> Result<Self, ConfigError> {
        if begin > end {
            return Err(ConfigError::InvalidOrdering {
                field: "time_range".to_string(),
                message: format!("begin {} is after end {}", begin, end),
            });
        }
        Ok(Self { begin, end })
    }

    /// Check if a timestamp falls inside the range
    #[inline]
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.begin && timestamp < self.end
    }

    /// Length of the range in seconds
    pub fn duration_secs(&self) -> f64 {
        self.end.seconds_since(self.begin)
    }

    /// Whether the range contains no instants
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.begin, self.end)
    }
}
