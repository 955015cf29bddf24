//! Pull-based event cursors
//!
//! Every pipeline stage implements [`EventCursor`]. A stage owns exactly one
//! upstream cursor (`Box<dyn EventCursor>`), pulls from it on demand and
//! forwards `close` to it. Callers drive the whole chain by calling `read`
//! until it returns `Ok(None)`.
//!
//! # Stages
//!
//! - [`ListCursor`]: source over an owned `Vec<Event>`
//! - [`BinSampleCursor`]: fixed-ratio run sampler
//! - [`LttbCursor`]: shape-preserving bucket sampler
//! - [`LabelJoinCursor`]: as-of join with enumeration labels
//! - [`BoundaryAwareCursor`]: pins events to the interval edges
//! - [`AnalysisCursor`] / [`IntegrationCursor`]: statistics taps
//! - [`IntervalSampleCursor`]: one sample per fixed time step
//!
//! # Example
//!
//! ```rust
//! use pvhist::event::Event;
//! use pvhist::stream::{BinSampleCursor, EventCursor, ListCursor};
//! use pvhist::params::BinSamplerParams;
//! use pvhist::types::Timestamp;
//!
//! let events: Vec<Event> = (0..10)
//!     .map(|i| Event::float(Timestamp::from_secs(i), i as f32))
//!     .collect();
//! let params = BinSamplerParams::new(5, 10);
//! let mut sampler = BinSampleCursor::new(Box::new(ListCursor::new(events)), params);
//!
//! let first = sampler.read().unwrap().unwrap();
//! assert_eq!(first.timestamp(), Timestamp::from_secs(1));
//! sampler.close().unwrap();
//! assert!(sampler.read().unwrap().is_none());
//! ```

pub mod analysis;
pub mod bin_sample;
pub mod boundary;
pub mod interval;
pub mod label;
pub mod lttb;

pub use analysis::{AnalysisCursor, IntegrationCursor};
pub use bin_sample::BinSampleCursor;
pub use boundary::BoundaryAwareCursor;
pub use interval::IntervalSampleCursor;
pub use label::LabelJoinCursor;
pub use lttb::{calculate_triangle_area, triangle_area, EventBucket, LttbCursor};

use crate::error::{Error, Result};
use crate::event::Event;

// ============================================================================
// Cursor Trait
// ============================================================================

/// Single-pass, closeable sequence of events
///
/// Events are produced in ascending timestamp order. A cursor cannot be
/// rewound. Once `read` has returned `Ok(None)` it keeps doing so, and a
/// closed cursor behaves the same way.
pub trait EventCursor: Send {
    /// Pull the next event
    ///
    /// Returns:
    /// - `Ok(Some(event))` - Next event in timestamp order
    /// - `Ok(None)` - End of stream, or the cursor is closed
    /// - `Err(e)` - The upstream resource failed
    fn read(&mut self) -> Result<Option<Event>>;

    /// Release the underlying resource
    ///
    /// Safe to call at any point and any number of times. Wrapping cursors
    /// forward the call to the cursor they own.
    fn close(&mut self) -> Result<()>;

    /// Whether the underlying resource is still held
    fn is_open(&self) -> bool;

    /// Cursor name for logging and error reports
    fn name(&self) -> &'static str;
}

impl<C: EventCursor + ?Sized> EventCursor for Box<C> {
    fn read(&mut self) -> Result<Option<Event>> {
        (**self).read()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Extension methods available on every cursor
pub trait EventCursorExt: EventCursor {
    /// Borrowing iterator over the remaining events
    ///
    /// Yields `Err` at most once and then stops.
    fn events(&mut self) -> Events<'_, Self>
    where
        Self: Sized,
    {
        Events {
            cursor: self,
            done: false,
        }
    }

    /// Read every remaining event, then close the cursor
    ///
    /// A read error wins over any error raised while closing.
    fn read_all(&mut self) -> Result<Vec<Event>>
    where
        Self: Sized,
    {
        read_all(self)
    }
}

impl<C: EventCursor + ?Sized> EventCursorExt for C {}

/// Iterator returned by [`EventCursorExt::events`]
pub struct Events<'a, C: EventCursor + ?Sized> {
    cursor: &'a mut C,
    done: bool,
}

impl<C: EventCursor + ?Sized> Iterator for Events<'_, C> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.read() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Drain a cursor into a vector and close it
pub fn read_all<C: EventCursor + ?Sized>(cursor: &mut C) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    loop {
        match cursor.read() {
            Ok(Some(event)) => events.push(event),
            Ok(None) => break,
            Err(e) => return close_after_error(cursor, e),
        }
    }
    cursor.close()?;
    Ok(events)
}

/// Close a cursor after a read failed, keeping the read error
///
/// A failure while closing is logged and otherwise dropped so that it
/// never masks the error already in flight.
pub fn close_after_error<C: EventCursor + ?Sized, T>(cursor: &mut C, error: Error) -> Result<T> {
    if let Err(close_err) = cursor.close() {
        tracing::warn!(
            cursor = cursor.name(),
            error = %close_err,
            "close failed after read error"
        );
    }
    Err(error)
}

// ============================================================================
// List Cursor
// ============================================================================

/// Cursor over an owned, already ordered list of events
pub struct ListCursor {
    events: std::vec::IntoIter<Event>,
    open: bool,
}

impl ListCursor {
    /// Create a cursor yielding `events` in order
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events: events.into_iter(),
            open: true,
        }
    }

    /// Cursor that yields nothing
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of events not yet read
    pub fn remaining(&self) -> usize {
        if self.open {
            self.events.len()
        } else {
            0
        }
    }
}

impl EventCursor for ListCursor {
    fn read(&mut self) -> Result<Option<Event>> {
        if !self.open {
            return Ok(None);
        }
        Ok(self.events.next())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.events = Vec::new().into_iter();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn name(&self) -> &'static str {
        "List"
    }
}

// ============================================================================
// Test Support
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::CursorError;
    use crate::event::EventCode;
    use crate::types::Timestamp;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Upstream stand-in that counts closes and can fail on demand
    pub struct MockCursor {
        events: std::vec::IntoIter<Event>,
        fail_after: Option<usize>,
        fail_close: bool,
        served: usize,
        open: bool,
        pub closes: Arc<AtomicUsize>,
    }

    impl MockCursor {
        pub fn new(events: Vec<Event>) -> Self {
            Self {
                events: events.into_iter(),
                fail_after: None,
                fail_close: false,
                served: 0,
                open: true,
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Fail the read following the first `n` successful ones
        pub fn failing_after(mut self, n: usize) -> Self {
            self.fail_after = Some(n);
            self
        }

        pub fn failing_close(mut self) -> Self {
            self.fail_close = true;
            self
        }

        pub fn close_counter(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.closes)
        }
    }

    impl EventCursor for MockCursor {
        fn read(&mut self) -> Result<Option<Event>> {
            if !self.open {
                return Ok(None);
            }
            if self.fail_after == Some(self.served) {
                return Err(CursorError::Upstream {
                    cursor: "Mock",
                    message: "connection reset".to_string(),
                }
                .into());
            }
            self.served += 1;
            Ok(self.events.next())
        }

        fn close(&mut self) -> Result<()> {
            if !self.open {
                return Ok(());
            }
            self.open = false;
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(CursorError::Close {
                    cursor: "Mock",
                    message: "socket already gone".to_string(),
                }
                .into());
            }
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn name(&self) -> &'static str {
            "Mock"
        }
    }

    /// Float update at `secs` seconds
    pub fn upd(secs: i64, value: f32) -> Event {
        Event::float(Timestamp::from_secs(secs), value)
    }

    /// Network disconnection at `secs` seconds
    pub fn gap(secs: i64) -> Event {
        Event::disconnection(
            Timestamp::from_secs(secs),
            EventCode::NetworkDisconnection,
            crate::event::ValueKind::Float,
        )
    }

    pub fn timestamps(events: &[Event]) -> Vec<i64> {
        events
            .iter()
            .map(|e| e.timestamp().as_nanos() / 1_000_000_000)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_list_cursor_reads_in_order() {
        let mut cursor = ListCursor::new(vec![upd(1, 1.0), upd(2, 2.0)]);
        assert_eq!(cursor.remaining(), 2);
        assert_eq!(cursor.read().unwrap(), Some(upd(1, 1.0)));
        assert_eq!(cursor.read().unwrap(), Some(upd(2, 2.0)));
        assert_eq!(cursor.read().unwrap(), None);
        assert_eq!(cursor.read().unwrap(), None);
    }

    #[test]
    fn test_list_cursor_close_is_idempotent() {
        let mut cursor = ListCursor::new(vec![upd(1, 1.0)]);
        assert!(cursor.is_open());
        cursor.close().unwrap();
        cursor.close().unwrap();
        assert!(!cursor.is_open());
        assert_eq!(cursor.read().unwrap(), None);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn test_events_iterator_stops_after_error() {
        let mut cursor = MockCursor::new(vec![upd(1, 1.0), upd(2, 2.0)]).failing_after(1);
        let results: Vec<_> = cursor.events().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_read_all_closes_cursor() {
        let mut cursor = MockCursor::new(vec![upd(1, 1.0), upd(2, 2.0)]);
        let closes = cursor.close_counter();
        let events = cursor.read_all().unwrap();
        assert_eq!(timestamps(&events), vec![1, 2]);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_error_does_not_mask_read_error() {
        let mut cursor = MockCursor::new(vec![upd(1, 1.0)])
            .failing_after(0)
            .failing_close();
        let closes = cursor.close_counter();
        let err = read_all(&mut cursor).unwrap_err();
        assert!(matches!(
            err,
            Error::Cursor(crate::error::CursorError::Upstream { .. })
        ));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
