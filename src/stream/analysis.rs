//! Statistics taps
//!
//! [`AnalysisCursor`] forwards events unchanged while accumulating
//! [`RunningStatistics`]. [`IntegrationCursor`] replaces each event's value
//! with the running time integral up to that event.

use super::EventCursor;
use crate::error::Result;
use crate::event::{Event, Value};
use crate::stats::{RunningStatistics, Statistics};

/// Pass-through cursor that accumulates statistics
pub struct AnalysisCursor {
    input: Box<dyn EventCursor>,
    stats: RunningStatistics,
}

impl AnalysisCursor {
    /// Wrap `input`
    pub fn new(input: Box<dyn EventCursor>) -> Self {
        Self {
            input,
            stats: RunningStatistics::new(),
        }
    }

    /// Snapshot of the statistics over the events read so far
    pub fn latest_stats(&self) -> Statistics {
        self.stats.snapshot()
    }

    /// The live accumulator
    pub fn statistics(&self) -> &RunningStatistics {
        &self.stats
    }
}

impl EventCursor for AnalysisCursor {
    fn read(&mut self) -> Result<Option<Event>> {
        let event = self.input.read()?;
        if let Some(event) = &event {
            self.stats.push(event);
        }
        Ok(event)
    }

    fn close(&mut self) -> Result<()> {
        self.input.close()
    }

    fn is_open(&self) -> bool {
        self.input.is_open()
    }

    fn name(&self) -> &'static str {
        "Analysis"
    }
}

/// Cursor emitting the running integral at each event
///
/// Each output keeps the timestamp and code of its input event and carries
/// the integral so far as a float, zero until two events have been seen.
pub struct IntegrationCursor {
    input: Box<dyn EventCursor>,
    stats: RunningStatistics,
}

impl IntegrationCursor {
    /// Wrap `input`
    pub fn new(input: Box<dyn EventCursor>) -> Self {
        Self {
            input,
            stats: RunningStatistics::new(),
        }
    }

    /// Snapshot of the statistics over the events read so far
    pub fn latest_stats(&self) -> Statistics {
        self.stats.snapshot()
    }
}

impl EventCursor for IntegrationCursor {
    fn read(&mut self) -> Result<Option<Event>> {
        let Some(event) = self.input.read()? else {
            return Ok(None);
        };
        self.stats.push(&event);
        let integral = self.stats.integration().unwrap_or(0.0);
        Ok(Some(event.with_value(Value::Float(integral as f32))))
    }

    fn close(&mut self) -> Result<()> {
        self.input.close()
    }

    fn is_open(&self) -> bool {
        self.input.is_open()
    }

    fn name(&self) -> &'static str {
        "Integration"
    }
}
