//! Fixed-ratio bin sampler
//!
//! Reduces an input of known size `count` to at most `limit` events by
//! reading runs of `count / limit` events and emitting the last event of
//! each run. The remainder `count mod limit` is spread over the runs with an
//! exact rational accumulator: every run adds `remainder / limit`, and a run
//! that carries the accumulator past a whole number is one event longer.
//! Over `limit` runs the extra events add up to exactly the remainder.

use super::EventCursor;
use crate::error::{CursorError, Result};
use crate::event::Event;
use crate::params::BinSamplerParams;

/// Cursor emitting the last event of each fixed-size run of its input
pub struct BinSampleCursor {
    /// Upstream cursor
    input: Box<dyn EventCursor>,
    /// Base run length
    bin_size: u64,
    /// Numerator added to the accumulator per run
    remainder: u64,
    /// Accumulator denominator
    limit: u64,
    /// Accumulated fraction, as a numerator over `limit`, kept below `limit`
    carry: u64,
    /// Upstream ran out
    exhausted: bool,
    /// An upstream read failed mid-run
    poisoned: bool,
}

impl BinSampleCursor {
    /// Wrap `input`, whose size was declared in `params`
    pub fn new(input: Box<dyn EventCursor>, params: BinSamplerParams) -> Self {
        let (bin_size, remainder, limit) = if params.passes_through() {
            (1, 0, 1)
        } else {
            (params.bin_size(), params.remainder(), params.limit)
        };
        tracing::debug!(
            limit = params.limit,
            count = params.count,
            bin_size,
            remainder,
            "bin sampler opened"
        );
        Self {
            input,
            bin_size,
            remainder,
            limit,
            carry: 0,
            exhausted: false,
            poisoned: false,
        }
    }

    /// Length of the next run, advancing the accumulator
    fn next_run_length(&mut self) -> u64 {
        self.carry += self.remainder;
        if self.carry >= self.limit {
            self.carry -= self.limit;
            self.bin_size + 1
        } else {
            self.bin_size
        }
    }
}

impl EventCursor for BinSampleCursor {
    fn read(&mut self) -> Result<Option<Event>> {
        if !self.input.is_open() {
            return Ok(None);
        }
        if self.poisoned {
            return Err(CursorError::Poisoned(self.name()).into());
        }
        if self.exhausted {
            return Ok(None);
        }

        let run = self.next_run_length();
        let mut last = None;
        for _ in 0..run {
            match self.input.read() {
                Ok(Some(event)) => last = Some(event),
                Ok(None) => {
                    self.exhausted = true;
                    return Ok(None);
                }
                Err(e) => {
                    self.poisoned = true;
                    return Err(e);
                }
            }
        }
        Ok(last)
    }

    fn close(&mut self) -> Result<()> {
        if self.input.is_open() {
            tracing::debug!(cursor = self.name(), "closing");
        }
        self.input.close()
    }

    fn is_open(&self) -> bool {
        self.input.is_open()
    }

    fn name(&self) -> &'static str {
        "BinSample"
    }
}
