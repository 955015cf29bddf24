//! Query and sampler parameter objects
//!
//! Each pipeline strategy takes one of these. Constructors validate their
//! inputs and return [`ConfigError`] so that a bad request is rejected before
//! any event is read.

use crate::error::ConfigError;
use crate::event::ValueKind;
use crate::types::{TimeRange, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Channels
// ============================================================================

/// Resolved channel identity, as returned by a metadata lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Storage identifier inside the archive
    pub id: u32,
    /// Channel name
    pub name: String,
    /// Payload type of the channel's events
    pub kind: ValueKind,
}

impl ChannelInfo {
    /// Create a channel identity
    pub fn new(id: u32, name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
        }
    }
}

impl fmt::Display for ChannelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

// ============================================================================
// Queries
// ============================================================================

/// Interval query over `[begin, end)`
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalQuery {
    /// Channel to read
    pub channel: ChannelInfo,
    /// Half-open window
    pub range: TimeRange,
    /// Drop disconnection events at the source
    pub updates_only: bool,
}

impl IntervalQuery {
    /// Create an interval query, rejecting `begin > end`
    pub fn new(
        channel: ChannelInfo,
        begin: Timestamp,
        end: Timestamp,
        updates_only: bool,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            channel,
            range: TimeRange::new(begin, end)?,
            updates_only,
        })
    }

    /// Window start (inclusive)
    pub fn begin(&self) -> Timestamp {
        self.range.begin
    }

    /// Window end (exclusive)
    pub fn end(&self) -> Timestamp {
        self.range.end
    }
}

/// Search direction for point queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Latest event strictly before the instant
    Before,
    /// Latest event at or before the instant
    BeforeOrAt,
    /// Earliest event strictly after the instant
    After,
    /// Earliest event at or after the instant
    AfterOrAt,
}

impl Direction {
    /// Whether the search walks backward in time
    pub fn is_backward(self) -> bool {
        matches!(self, Direction::Before | Direction::BeforeOrAt)
    }

    /// Whether an event at `candidate` satisfies the direction relative to `target`
    pub fn accepts(self, candidate: Timestamp, target: Timestamp) -> bool {
        match self {
            Direction::Before => candidate < target,
            Direction::BeforeOrAt => candidate <= target,
            Direction::After => candidate > target,
            Direction::AfterOrAt => candidate >= target,
        }
    }
}

/// Single-event lookup near an instant
#[derive(Debug, Clone, PartialEq)]
pub struct PointQuery {
    /// Channel to read
    pub channel: ChannelInfo,
    /// Reference instant
    pub timestamp: Timestamp,
    /// Which side of the instant to search
    pub direction: Direction,
    /// Ignore disconnection events while searching
    pub updates_only: bool,
}

impl PointQuery {
    /// Create a point query
    pub fn new(channel: ChannelInfo, timestamp: Timestamp, direction: Direction) -> Self {
        Self {
            channel,
            timestamp,
            direction,
            updates_only: false,
        }
    }

    /// Restrict the search to data events
    pub fn updates_only(mut self, updates_only: bool) -> Self {
        self.updates_only = updates_only;
        self
    }
}

// ============================================================================
// Sampler Parameters
// ============================================================================

/// Fixed-ratio bin sampling: at most `limit` events out of `count`
///
/// `count` is the known input size and must come from a prior count query.
/// A zero `limit`, or a `count` that already fits, turns the sampler into a
/// pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinSamplerParams {
    /// Cap on output size
    pub limit: u64,
    /// Declared input size
    pub count: u64,
}

impl BinSamplerParams {
    /// Create bin sampler parameters
    pub fn new(limit: u64, count: u64) -> Self {
        Self { limit, count }
    }

    /// Whether every input event is emitted
    pub fn passes_through(&self) -> bool {
        self.limit == 0 || self.count <= self.limit
    }

    /// Base run length, `count / limit`
    pub fn bin_size(&self) -> u64 {
        if self.passes_through() {
            1
        } else {
            self.count / self.limit
        }
    }

    /// Remainder spread across runs, `count mod limit`
    pub fn remainder(&self) -> u64 {
        if self.passes_through() {
            0
        } else {
            self.count % self.limit
        }
    }
}

/// Shape-preserving bucket (LTTB) sampling parameters
///
/// Deserialization goes through [`GraphicalSamplerParams::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGraphicalSamplerParams")]
pub struct GraphicalSamplerParams {
    num_bins: u64,
    count: u64,
}

#[derive(Deserialize)]
struct RawGraphicalSamplerParams {
    num_bins: u64,
    count: u64,
}

impl TryFrom<RawGraphicalSamplerParams> for GraphicalSamplerParams {
    type Error = ConfigError;

    fn try_from(raw: RawGraphicalSamplerParams) -> Result<Self, Self::Error> {
        Self::new(raw.num_bins, raw.count)
    }
}

impl GraphicalSamplerParams {
    /// Validate and create bucket sampler parameters
    ///
    /// Rejects `num_bins == 0` for a non-empty input, and fewer than three
    /// bins whenever the input has to be reduced (the first and last events
    /// are anchors and need at least one bucket between them).
    pub fn new(num_bins: u64, count: u64) -> Result<Self, ConfigError> {
        if num_bins == 0 && count > 0 {
            tracing::warn!(count, "bucket sampler requested with zero bins");
            return Err(ConfigError::out_of_range("num_bins", num_bins, 1, u64::MAX));
        }
        if count > num_bins && num_bins < 3 {
            tracing::warn!(num_bins, count, "too few bins to reduce input");
            return Err(ConfigError::out_of_range("num_bins", num_bins, 3, u64::MAX));
        }
        Ok(Self { num_bins, count })
    }

    /// Requested number of bins
    pub fn num_bins(&self) -> u64 {
        self.num_bins
    }

    /// Declared input size
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Whether every input event is emitted unchanged
    pub fn passes_through(&self) -> bool {
        self.count <= self.num_bins
    }

    /// Events per interior bucket, `ceil((count - 2) / (num_bins - 2))`
    pub fn bin_size(&self) -> u64 {
        if self.passes_through() {
            return 1;
        }
        let interior = self.count - 2;
        let bins = self.num_bins - 2;
        interior.div_ceil(bins).max(1)
    }
}

/// How the fixed-interval sampler obtains each sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Pick from the event density and the configured threshold
    #[default]
    Auto,
    /// Stream the whole interval once
    Stream,
    /// One point query per sample
    PointQueries,
}

/// Fixed-interval sampling: `sample_count` samples starting at `begin`
///
/// Deserialization goes through [`IntervalSamplerParams::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawIntervalSamplerParams")]
pub struct IntervalSamplerParams {
    begin: Timestamp,
    interval_millis: i64,
    sample_count: u64,
}

#[derive(Deserialize)]
struct RawIntervalSamplerParams {
    begin: Timestamp,
    interval_millis: i64,
    sample_count: u64,
}

impl TryFrom<RawIntervalSamplerParams> for IntervalSamplerParams {
    type Error = ConfigError;

    fn try_from(raw: RawIntervalSamplerParams) -> Result<Self, Self::Error> {
        Self::new(raw.begin, raw.interval_millis, raw.sample_count)
    }
}

impl IntervalSamplerParams {
    /// Validate and create fixed-interval sampler parameters
    pub fn new(
        begin: Timestamp,
        interval_millis: i64,
        sample_count: u64,
    ) -> Result<Self, ConfigError> {
        if interval_millis <= 0 {
            return Err(ConfigError::out_of_range(
                "interval_millis",
                interval_millis,
                1,
                i64::MAX,
            ));
        }
        if sample_count == 0 {
            return Err(ConfigError::out_of_range("sample_count", 0, 1, u64::MAX));
        }
        Ok(Self {
            begin,
            interval_millis,
            sample_count,
        })
    }

    /// First sample time
    pub fn begin(&self) -> Timestamp {
        self.begin
    }

    /// Milliseconds between samples
    pub fn interval_millis(&self) -> i64 {
        self.interval_millis
    }

    /// Number of samples, including the one at `begin`
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Time of sample `k`
    pub fn sample_time(&self, k: u64) -> Timestamp {
        let steps = i64::try_from(k).unwrap_or(i64::MAX);
        self.begin
            .plus_millis(self.interval_millis.saturating_mul(steps))
    }

    /// Time of the last sample
    pub fn last_sample_time(&self) -> Timestamp {
        self.sample_time(self.sample_count - 1)
    }

    /// Exclusive end of the span holding every sample
    ///
    /// One nanosecond past the last sample, so an event exactly at the last
    /// sample time falls inside a half-open query ending here.
    pub fn end(&self) -> Timestamp {
        self.last_sample_time().plus_nanos(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> ChannelInfo {
        ChannelInfo::new(7, "R123PMES", ValueKind::Float)
    }

    #[test]
    fn test_interval_query_validation() {
        let ok = IntervalQuery::new(
            channel(),
            Timestamp::from_secs(1),
            Timestamp::from_secs(2),
            false,
        );
        assert!(ok.is_ok());

        let bad = IntervalQuery::new(
            channel(),
            Timestamp::from_secs(2),
            Timestamp::from_secs(1),
            false,
        );
        assert!(matches!(bad, Err(ConfigError::InvalidOrdering { .. })));
    }

    #[test]
    fn test_direction_accepts() {
        let t = Timestamp::from_secs(10);
        assert!(Direction::BeforeOrAt.accepts(t, t));
        assert!(!Direction::Before.accepts(t, t));
        assert!(Direction::AfterOrAt.accepts(t, t));
        assert!(!Direction::After.accepts(t, t));
        assert!(Direction::Before.accepts(Timestamp::from_secs(9), t));
        assert!(Direction::Before.is_backward());
        assert!(!Direction::AfterOrAt.is_backward());
    }

    #[test]
    fn test_bin_sampler_params() {
        let params = BinSamplerParams::new(3, 10);
        assert!(!params.passes_through());
        assert_eq!(params.bin_size(), 3);
        assert_eq!(params.remainder(), 1);

        assert!(BinSamplerParams::new(0, 10).passes_through());
        assert!(BinSamplerParams::new(10, 10).passes_through());
        assert_eq!(BinSamplerParams::new(0, 10).bin_size(), 1);
    }

    #[test]
    fn test_graphical_params_validation() {
        assert!(GraphicalSamplerParams::new(0, 0).is_ok());
        assert!(matches!(
            GraphicalSamplerParams::new(0, 5),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(GraphicalSamplerParams::new(2, 2).is_ok());
        assert!(GraphicalSamplerParams::new(2, 3).is_err());
        assert!(GraphicalSamplerParams::new(3, 100).is_ok());
    }

    #[test]
    fn test_graphical_bin_size() {
        let params = GraphicalSamplerParams::new(10, 100).unwrap();
        assert_eq!(params.bin_size(), 13); // ceil(98 / 8)
        let params = GraphicalSamplerParams::new(3, 4).unwrap();
        assert_eq!(params.bin_size(), 2);
        let params = GraphicalSamplerParams::new(50, 20).unwrap();
        assert!(params.passes_through());
    }

    #[test]
    fn test_interval_sampler_params() {
        let params = IntervalSamplerParams::new(Timestamp::from_secs(100), 1_000, 5).unwrap();
        assert_eq!(params.sample_time(0), Timestamp::from_secs(100));
        assert_eq!(params.sample_time(3), Timestamp::from_secs(103));
        assert_eq!(params.last_sample_time(), Timestamp::from_secs(104));
        assert_eq!(params.end(), Timestamp::from_secs(104).plus_nanos(1));

        assert!(IntervalSamplerParams::new(Timestamp::EPOCH, 0, 5).is_err());
        assert!(IntervalSamplerParams::new(Timestamp::EPOCH, 10, 0).is_err());
    }

    #[test]
    fn test_deserialize_validates_graphical_params() {
        let params: GraphicalSamplerParams = toml::from_str("num_bins = 10\ncount = 500").unwrap();
        assert_eq!(params, GraphicalSamplerParams::new(10, 500).unwrap());
        assert_eq!(params.bin_size(), 63); // ceil(498 / 8)

        let err = toml::from_str::<GraphicalSamplerParams>("num_bins = 2\ncount = 5").unwrap_err();
        assert!(err.to_string().contains("num_bins"));
        assert!(toml::from_str::<GraphicalSamplerParams>("num_bins = 0\ncount = 1").is_err());
    }

    #[test]
    fn test_deserialize_validates_interval_params() {
        let params: IntervalSamplerParams =
            toml::from_str("begin = 0\ninterval_millis = 1000\nsample_count = 3").unwrap();
        assert_eq!(params.last_sample_time(), Timestamp::from_secs(2));

        let err = toml::from_str::<IntervalSamplerParams>(
            "begin = 0\ninterval_millis = 1000\nsample_count = 0",
        )
        .unwrap_err();
        assert!(err.to_string().contains("sample_count"));
        assert!(toml::from_str::<IntervalSamplerParams>(
            "begin = 0\ninterval_millis = -5\nsample_count = 3"
        )
        .is_err());
    }

    #[test]
    fn test_serialized_params_reload() {
        let params = IntervalSamplerParams::new(Timestamp::from_secs(60), 500, 8).unwrap();
        let text = toml::to_string(&params).unwrap();
        assert_eq!(toml::from_str::<IntervalSamplerParams>(&text).unwrap(), params);
    }
}
