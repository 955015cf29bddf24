//! Fixed-interval sampler
//!
//! Emits `sample_count` events at `begin + k * interval`. Each sample takes
//! the code and payload of the latest event at or before its sample time.
//! Samples later than "now", or with nothing before them, come out as
//! `Undefined` events carrying the zero payload of the channel's kind.
//!
//! Two strategies produce identical output:
//!
//! - **Stream**: a single pass over a [`BoundaryAwareCursor`] covering
//!   `[begin, last sample]`, keeping two events that straddle the current
//!   sample time. Cheap when events are sparse relative to samples.
//! - **Point queries**: one "latest at or before" lookup per sample through a
//!   [`PointSource`]. Cheap when events are dense.

use super::{BoundaryAwareCursor, EventCursor};
use crate::error::{CursorError, Result};
use crate::event::{Event, ValueKind};
use crate::params::IntervalSamplerParams;
use crate::types::{TimeRange, Timestamp};

/// Lookup of the latest event at or before an instant
pub trait PointSource: Send {
    /// Latest event with `timestamp <= at`, if any
    fn latest_at_or_before(&mut self, at: Timestamp) -> Result<Option<Event>>;
}

enum Source {
    Stream {
        input: Box<dyn EventCursor>,
        previous: Option<Event>,
        current: Option<Event>,
        started: bool,
    },
    Points {
        lookup: Box<dyn PointSource>,
        open: bool,
    },
}

/// Cursor producing one sample per fixed time step
pub struct IntervalSampleCursor {
    source: Source,
    params: IntervalSamplerParams,
    kind: ValueKind,
    /// Samples after this instant are undefined
    now: Timestamp,
    taken: u64,
    finished: bool,
    poisoned: bool,
}

impl IntervalSampleCursor {
    /// Sample by streaming `input`
    ///
    /// `input` must cover `[params.begin(), params.end())`. `prior_point` is
    /// the latest event before `begin`; without one the stream starts from
    /// an `Undefined` event just before `begin`.
    pub fn streaming(
        input: Box<dyn EventCursor>,
        params: IntervalSamplerParams,
        prior_point: Option<Event>,
        updates_only: bool,
        kind: ValueKind,
    ) -> Self {
        let begin = params.begin();
        let prior = prior_point.unwrap_or_else(|| Event::undefined(begin.plus_millis(-1), kind));
        let range = TimeRange {
            begin,
            end: params.end(),
        };
        let bounded = BoundaryAwareCursor::new(input, range, Some(prior), updates_only);
        tracing::debug!(
            begin = %begin,
            interval_millis = params.interval_millis(),
            samples = params.sample_count(),
            "interval sampler opened (stream)"
        );
        Self::with_source(
            Source::Stream {
                input: Box::new(bounded),
                previous: None,
                current: None,
                started: false,
            },
            params,
            kind,
        )
    }

    /// Sample with one point lookup per sample
    pub fn point_queries(
        lookup: Box<dyn PointSource>,
        params: IntervalSamplerParams,
        kind: ValueKind,
    ) -> Self {
        tracing::debug!(
            begin = %params.begin(),
            interval_millis = params.interval_millis(),
            samples = params.sample_count(),
            "interval sampler opened (point queries)"
        );
        Self::with_source(Source::Points { lookup, open: true }, params, kind)
    }

    fn with_source(source: Source, params: IntervalSamplerParams, kind: ValueKind) -> Self {
        Self {
            source,
            params,
            kind,
            now: Timestamp::now(),
            taken: 0,
            finished: false,
            poisoned: false,
        }
    }

    /// Treat `now` as the current time when deciding which samples lie in the future
    pub fn with_now(mut self, now: Timestamp) -> Self {
        self.now = now;
        self
    }

    /// Whether samples are read from a stream rather than point lookups
    pub fn is_streaming(&self) -> bool {
        matches!(self.source, Source::Stream { .. })
    }

    fn sample(&mut self, at: Timestamp) -> Result<Option<Event>> {
        let interval = self.params.interval_millis();
        let kind = self.kind;
        match &mut self.source {
            Source::Points { lookup, .. } => Ok(Some(
                lookup
                    .latest_at_or_before(at)?
                    .map_or_else(|| Event::undefined(at, kind), |e| e.copy_to(at)),
            )),
            Source::Stream {
                input,
                previous,
                current,
                started,
            } => {
                if !*started {
                    *started = true;
                    *previous = input.read()?;
                    *current = input.read()?;
                }
                let (mut prev, mut cur) = match (previous.take(), current.take()) {
                    (Some(p), Some(c)) => (p, c),
                    (Some(p), None) => {
                        let c = p.copy_to(at);
                        (p, c)
                    }
                    (None, _) => return Ok(None),
                };

                // Advance until prev <= at < cur
                while prev.timestamp() <= at && cur.timestamp() <= at {
                    prev = cur;
                    cur = match input.read()? {
                        Some(next) => next,
                        None => prev.copy_to(at.plus_millis(interval)),
                    };
                }

                let out = prev.copy_to(at);
                *previous = Some(prev);
                *current = Some(cur);
                Ok(Some(out))
            }
        }
    }
}

impl EventCursor for IntervalSampleCursor {
    fn read(&mut self) -> Result<Option<Event>> {
        if !self.is_open() || self.finished {
            return Ok(None);
        }
        if self.poisoned {
            return Err(CursorError::Poisoned(self.name()).into());
        }

        let at = self.params.sample_time(self.taken);
        let out = if at > self.now {
            Some(Event::undefined(at, self.kind))
        } else {
            match self.sample(at) {
                Ok(out) => out,
                Err(e) => {
                    self.poisoned = true;
                    return Err(e);
                }
            }
        };

        match out {
            Some(event) => {
                self.taken += 1;
                if self.taken >= self.params.sample_count() {
                    self.finished = true;
                }
                Ok(Some(event))
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        match &mut self.source {
            Source::Stream { input, .. } => input.close(),
            Source::Points { open, .. } => {
                *open = false;
                Ok(())
            }
        }
    }

    fn is_open(&self) -> bool {
        match &self.source {
            Source::Stream { input, .. } => input.is_open(),
            Source::Points { open, .. } => *open,
        }
    }

    fn name(&self) -> &'static str {
        "IntervalSample"
    }
}
