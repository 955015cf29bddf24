//! Boundary-aware cursor
//!
//! Guarantees that a stream over `[begin, end)` has a value at both edges.
//! When the first upstream event comes after `begin` (or there is none), a
//! copy of the prior point moved to `begin` is emitted first. When the
//! stream ends, the last event seen is repeated once at `end`.

use super::EventCursor;
use crate::error::Result;
use crate::event::Event;
use crate::types::TimeRange;

enum Phase {
    /// Nothing read yet
    Start,
    /// The begin copy went out, the first upstream event is held back
    Buffered(Event),
    /// Forwarding upstream events
    Streaming,
    /// End copy emitted or not needed
    Done,
}

/// Cursor pinning events to both edges of its interval
pub struct BoundaryAwareCursor {
    input: Box<dyn EventCursor>,
    range: TimeRange,
    prior_point: Option<Event>,
    updates_only: bool,
    phase: Phase,
    /// Event to repeat at the end of the interval
    last_event: Option<Event>,
}

impl BoundaryAwareCursor {
    /// Wrap `input`, which yields events inside `range`
    ///
    /// `prior_point` is the latest event before `range.begin`, if any. With
    /// `updates_only`, disconnection events are never repeated at the end.
    pub fn new(
        input: Box<dyn EventCursor>,
        range: TimeRange,
        prior_point: Option<Event>,
        updates_only: bool,
    ) -> Self {
        Self {
            input,
            range,
            prior_point,
            updates_only,
            phase: Phase::Start,
            last_event: None,
        }
    }

    fn begin_copy(&self) -> Option<Event> {
        self.prior_point
            .as_ref()
            .map(|prior| prior.copy_to(self.range.begin))
    }

    fn next_inner(&mut self) -> Result<Option<Event>> {
        match std::mem::replace(&mut self.phase, Phase::Streaming) {
            Phase::Start => {
                let first = self.input.read()?;
                let late = first
                    .as_ref()
                    .map_or(true, |e| e.timestamp() > self.range.begin);
                match self.begin_copy() {
                    Some(copy) if late => {
                        if let Some(first) = first {
                            self.phase = Phase::Buffered(first);
                        }
                        Ok(Some(copy))
                    }
                    _ => Ok(first),
                }
            }
            Phase::Buffered(event) => Ok(Some(event)),
            Phase::Streaming => self.input.read(),
            Phase::Done => {
                self.phase = Phase::Done;
                Ok(None)
            }
        }
    }
}

impl EventCursor for BoundaryAwareCursor {
    fn read(&mut self) -> Result<Option<Event>> {
        if !self.input.is_open() {
            return Ok(None);
        }
        match self.next_inner()? {
            Some(event) => {
                if !self.updates_only || event.code().is_data() {
                    self.last_event = Some(event.clone());
                }
                Ok(Some(event))
            }
            None => {
                self.phase = Phase::Done;
                Ok(self
                    .last_event
                    .take()
                    .filter(|last| last.timestamp() < self.range.end)
                    .map(|last| last.copy_to(self.range.end)))
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.phase = Phase::Done;
        self.last_event = None;
        self.input.close()
    }

    fn is_open(&self) -> bool {
        self.input.is_open()
    }

    fn name(&self) -> &'static str {
        "BoundaryAware"
    }
}
