//! Time-weighted running statistics
//!
//! The event stream is treated as a right-continuous step function: a value
//! holds from the event that set it until the next event. Each value is
//! weighted by the time until the following event, so the last pushed value
//! never contributes weight. Intervals that start at a disconnection event
//! are excluded entirely, from both weight and duration.
//!
//! # Example
//!
//! ```rust
//! use pvhist::event::Event;
//! use pvhist::stats::RunningStatistics;
//! use pvhist::types::Timestamp;
//!
//! let mut stats = RunningStatistics::new();
//! for (secs, value) in [(0, 1.0), (600, 2.0), (1200, 3.0), (2400, 4.0)] {
//!     stats.push(&Event::float(Timestamp::from_secs(secs), value));
//! }
//! assert_eq!(stats.mean(), Some(2.25));
//! assert_eq!(stats.max(), Some(4.0));
//! ```

use crate::error::Result;
use crate::event::Event;
use crate::stream::EventCursor;
use serde::{Deserialize, Serialize};

// ============================================================================
// Compensated Summation
// ============================================================================

/// Kahan summation for accurate floating-point sums
///
/// Long intervals accumulate many small `value * dt` products; plain `f64`
/// addition drifts noticeably after a few million of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct KahanSum {
    sum: f64,
    compensation: f64,
}

impl KahanSum {
    /// Create a new sum accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value to the sum
    #[inline]
    pub fn add(&mut self, value: f64) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    /// Get the current sum
    #[inline]
    pub fn sum(&self) -> f64 {
        self.sum
    }
}

// ============================================================================
// Statistics Snapshot
// ============================================================================

/// Immutable snapshot of a [`RunningStatistics`]
///
/// Fields are `None` when the accumulator had nothing to report for them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Smallest data value seen
    pub min: Option<f64>,
    /// Largest data value seen
    pub max: Option<f64>,
    /// Time-weighted mean
    pub mean: Option<f64>,
    /// Time-weighted population standard deviation
    pub sigma: Option<f64>,
    /// Time-weighted root mean square
    pub rms: Option<f64>,
    /// Seconds covered by weighted intervals
    pub duration: Option<f64>,
    /// Time integral of the value, in value-seconds
    pub integration: Option<f64>,
    /// Events pushed
    pub event_count: u64,
    /// Data events with a usable numeric payload
    pub update_count: u64,
}

// ============================================================================
// Running Statistics
// ============================================================================

/// Online accumulator for time-weighted statistics
///
/// Memory use is constant: only the sums and the previous event are kept.
#[derive(Debug, Clone, Default)]
pub struct RunningStatistics {
    /// Smallest data value
    min: Option<f64>,
    /// Largest data value
    max: Option<f64>,
    /// Events pushed since creation or the last reset
    count: u64,
    /// Data events that carried a usable numeric payload
    update_count: u64,
    /// Sum of weights (seconds)
    total_weight: KahanSum,
    /// Sum of `value * dt`
    weighted_sum: KahanSum,
    /// Sum of `value^2 * dt`
    weighted_sum_sq: KahanSum,
    /// Seconds covered by weighted intervals
    weighted_duration: KahanSum,
    /// Previous event, whatever its code
    last_event: Option<Event>,
}

impl RunningStatistics {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next event in timestamp order
    pub fn push(&mut self, event: &Event) {
        self.count += 1;

        if let Some(previous) = &self.last_event {
            // A disconnected or malformed previous value leaves the interval unweighted
            if let Some(value) = previous.numeric_value() {
                let dt = event.timestamp().seconds_since(previous.timestamp());
                if dt >= 0.0 {
                    self.weighted_sum.add(value * dt);
                    self.weighted_sum_sq.add(value * value * dt);
                    self.total_weight.add(dt);
                    self.weighted_duration.add(dt);
                } else {
                    tracing::warn!(
                        previous = %previous.timestamp(),
                        current = %event.timestamp(),
                        "out-of-order event ignored for weighting"
                    );
                }
            }
        }

        if event.code().is_data() {
            match event.numeric_value() {
                Some(value) => {
                    self.update_count += 1;
                    self.min = Some(self.min.map_or(value, |m| m.min(value)));
                    self.max = Some(self.max.map_or(value, |m| m.max(value)));
                }
                None => {
                    tracing::trace!(
                        timestamp = %event.timestamp(),
                        code = ?event.code(),
                        "non-numeric payload skipped"
                    );
                }
            }
        }

        self.last_event = Some(event.clone());
    }

    /// Push every remaining event of a cursor, then close it
    pub fn consume<C: EventCursor + ?Sized>(&mut self, cursor: &mut C) -> Result<()> {
        loop {
            match cursor.read() {
                Ok(Some(event)) => self.push(&event),
                Ok(None) => break,
                Err(e) => return crate::stream::close_after_error(cursor, e),
            }
        }
        cursor.close()
    }

    /// Clear all state back to an empty accumulator
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn weight(&self) -> Option<f64> {
        let w = self.total_weight.sum();
        if w > 0.0 {
            Some(w)
        } else {
            None
        }
    }

    /// Smallest data value
    pub fn min(&self) -> Option<f64> {
        self.min
    }

    /// Largest data value
    pub fn max(&self) -> Option<f64> {
        self.max
    }

    /// Number of events pushed
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Number of data events with a usable numeric payload
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Time-weighted mean
    pub fn mean(&self) -> Option<f64> {
        self.weight().map(|w| self.weighted_sum.sum() / w)
    }

    /// Time-weighted population standard deviation
    pub fn sigma(&self) -> Option<f64> {
        let w = self.weight()?;
        let mean = self.weighted_sum.sum() / w;
        let variance = self.weighted_sum_sq.sum() / w - mean * mean;
        // Rounding can push a zero variance slightly negative
        Some(variance.max(0.0).sqrt())
    }

    /// Time-weighted root mean square
    pub fn rms(&self) -> Option<f64> {
        self.weight()
            .map(|w| (self.weighted_sum_sq.sum() / w).max(0.0).sqrt())
    }

    /// Seconds covered by weighted intervals
    pub fn duration(&self) -> Option<f64> {
        self.weight().map(|_| self.weighted_duration.sum())
    }

    /// Time integral of the value over weighted intervals
    pub fn integration(&self) -> Option<f64> {
        self.weight().map(|_| self.weighted_sum.sum())
    }

    /// The most recently pushed event
    pub fn last_event(&self) -> Option<&Event> {
        self.last_event.as_ref()
    }

    /// Snapshot of every statistic
    pub fn snapshot(&self) -> Statistics {
        Statistics {
            min: self.min(),
            max: self.max(),
            mean: self.mean(),
            sigma: self.sigma(),
            rms: self.rms(),
            duration: self.duration(),
            integration: self.integration(),
            event_count: self.count,
            update_count: self.update_count,
        }
    }
}
