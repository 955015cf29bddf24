//! Shape-preserving bucket sampler (Largest Triangle Three Buckets)
//!
//! Reduces a run of events to a small number of visually representative
//! points without ever hiding a gap in monitoring:
//!
//! - **Anchors**: the first event with a numeric value and the last event of
//!   the run are always emitted. Events ahead of the first anchor are emitted
//!   unchanged.
//! - **Forced-keep set**: every disconnection event in a bucket, plus the data
//!   events directly next to one in stream order. These bypass selection.
//! - **Candidates**: the remaining data events. The one forming the largest
//!   triangle with the previous selection (left anchor) and the first event
//!   of the next bucket (right anchor) is the bucket's representative.
//!
//! Buckets hold `ceil((count - 2) / (num_bins - 2))` events, so memory is
//! bounded by one bucket plus one lookahead event.

use super::EventCursor;
use crate::error::{CursorError, Result};
use crate::event::Event;
use crate::params::GraphicalSamplerParams;
use std::collections::VecDeque;

// ============================================================================
// Triangle Area
// ============================================================================

/// Unsigned area of the triangle with vertices `a`, `b`, `c` as `(x, y)`
#[inline]
pub fn triangle_area(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    let (x1, y1) = a;
    let (x2, y2) = b;
    let (x3, y3) = c;
    0.5 * (x1 * (y2 - y3) + x2 * (y3 - y1) + x3 * (y1 - y2)).abs()
}

/// Triangle area spanned by three events
///
/// The time axis is in seconds measured from the earliest of the three
/// timestamps, so the result does not depend on the epoch offset. Returns
/// `None` when the middle event has no numeric value. An anchor without a
/// numeric value (a disconnection) borrows the other anchor's value; when
/// neither has one, both take the middle value and the area is zero.
pub fn calculate_triangle_area(left: &Event, point: &Event, right: &Event) -> Option<f64> {
    let y2 = point.numeric_value()?;
    let (y1, y3) = match (left.numeric_value(), right.numeric_value()) {
        (Some(y1), Some(y3)) => (y1, y3),
        (Some(y1), None) => (y1, y1),
        (None, Some(y3)) => (y3, y3),
        (None, None) => (y2, y2),
    };

    // Fixed endpoint order keeps the result bit-identical when the anchors swap
    let (first, y1, last, y3) = if (left.timestamp(), y1.to_bits()) <= (right.timestamp(), y3.to_bits())
    {
        (left, y1, right, y3)
    } else {
        (right, y3, left, y1)
    };

    let origin = first.timestamp().min(point.timestamp()).min(last.timestamp());
    let x1 = first.timestamp().seconds_since(origin);
    let x2 = point.timestamp().seconds_since(origin);
    let x3 = last.timestamp().seconds_since(origin);

    Some(triangle_area((x1, y1), (x2, y2), (x3, y3)))
}

// ============================================================================
// Event Bucket
// ============================================================================

/// Contiguous slice of events forming one sampling window
///
/// A bucket is built once, sampled once and discarded. It keeps no anchor
/// state of its own; the orchestrating sampler passes anchors in.
#[derive(Debug, Clone)]
pub struct EventBucket {
    events: Vec<Event>,
    /// Event just before the bucket is a disconnection
    preceded_by_disconnection: bool,
    /// Event just after the bucket is a disconnection
    followed_by_disconnection: bool,
}

impl EventBucket {
    /// Bucket with no disconnection on either side
    pub fn new(events: Vec<Event>) -> Self {
        Self::with_neighbours(events, false, false)
    }

    /// Bucket whose outer neighbours may be disconnections
    pub fn with_neighbours(
        events: Vec<Event>,
        preceded_by_disconnection: bool,
        followed_by_disconnection: bool,
    ) -> Self {
        Self {
            events,
            preceded_by_disconnection,
            followed_by_disconnection,
        }
    }

    /// Events in the bucket
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the bucket holds no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether the last event of the bucket is a disconnection
    pub fn ends_with_disconnection(&self) -> bool {
        self.events.last().is_some_and(Event::is_disconnection)
    }

    /// Mask of events that must be emitted regardless of selection
    pub fn forced_keep(&self) -> Vec<bool> {
        let n = self.events.len();
        let mut keep = vec![false; n];
        for (i, event) in self.events.iter().enumerate() {
            if event.is_disconnection() {
                keep[i] = true;
                if i > 0 {
                    keep[i - 1] = true;
                }
                if i + 1 < n {
                    keep[i + 1] = true;
                }
            }
        }
        if n > 0 {
            if self.preceded_by_disconnection {
                keep[0] = true;
            }
            if self.followed_by_disconnection {
                keep[n - 1] = true;
            }
        }
        keep
    }

    fn select_index(&self, keep: &[bool], left: &Event, right: &Event) -> Option<usize> {
        let mut best: Option<usize> = None;
        let mut best_area = -1.0;
        for (i, event) in self.events.iter().enumerate() {
            if keep[i] || event.is_disconnection() {
                continue;
            }
            let Some(area) = calculate_triangle_area(left, event, right) else {
                tracing::trace!(timestamp = %event.timestamp(), "candidate without numeric value");
                continue;
            };
            // Strict comparison: the first of equal areas wins
            if area > best_area {
                best_area = area;
                best = Some(i);
            }
        }
        best.or_else(|| self.events.len().checked_sub(1))
    }

    /// Select the representative between two anchors
    ///
    /// Picks the candidate with the largest triangle area. With no scorable
    /// candidate the last event of the bucket is returned, and `None` only
    /// for an empty bucket.
    pub fn down_sample(&self, left: &Event, right: &Event) -> Option<&Event> {
        let keep = self.forced_keep();
        self.select_index(&keep, left, right)
            .map(|i| &self.events[i])
    }

    /// Consume the bucket into its representative and its output events
    ///
    /// The output holds the forced-keep set and the representative, in
    /// stream order and without duplicates.
    pub fn into_output(self, left: &Event, right: &Event) -> (Option<Event>, Vec<Event>) {
        let keep = self.forced_keep();
        let selected = self.select_index(&keep, left, right);
        let mut representative = None;
        let mut output = Vec::new();
        for (i, event) in self.events.into_iter().enumerate() {
            if Some(i) == selected {
                representative = Some(event.clone());
                output.push(event);
            } else if keep[i] {
                output.push(event);
            }
        }
        (representative, output)
    }
}

// ============================================================================
// LTTB Cursor
// ============================================================================

/// Cursor that streams the bucket sampler over its input
pub struct LttbCursor {
    /// Upstream cursor
    input: Box<dyn EventCursor>,
    /// Events per bucket
    bin_size: u64,
    /// Emit input unchanged
    pass_through: bool,
    /// Sampled events ready to be returned
    queue: VecDeque<Event>,
    /// Left anchor for the next bucket
    left_anchor: Option<Event>,
    /// Events of the bucket being filled
    bucket: Vec<Event>,
    /// One-event lookahead, not yet assigned to a bucket
    pending: Option<Event>,
    /// Last event of the previous bucket was a disconnection
    after_disconnection: bool,
    /// Input events assigned so far, anchors included
    processed: u64,
    /// Value of `processed` at which the current bucket closes
    boundary: u64,
    /// Upstream is exhausted and the final anchor is queued
    finished: bool,
    /// An upstream read failed
    poisoned: bool,
}

impl LttbCursor {
    /// Wrap `input`, whose size was declared in `params`
    pub fn new(input: Box<dyn EventCursor>, params: GraphicalSamplerParams) -> Self {
        let bin_size = params.bin_size();
        tracing::debug!(
            num_bins = params.num_bins(),
            count = params.count(),
            bin_size,
            pass_through = params.passes_through(),
            "bucket sampler opened"
        );
        Self {
            input,
            bin_size,
            pass_through: params.passes_through(),
            queue: VecDeque::new(),
            left_anchor: None,
            bucket: Vec::with_capacity(usize::try_from(bin_size).unwrap_or(0)),
            pending: None,
            after_disconnection: false,
            processed: 0,
            boundary: 0,
            finished: false,
            poisoned: false,
        }
    }

    fn upstream(&mut self) -> Result<Option<Event>> {
        self.input.read().map_err(|e| {
            self.poisoned = true;
            e
        })
    }

    /// Queue leading events and the first anchor
    fn find_first_anchor(&mut self) -> Result<()> {
        while let Some(event) = self.upstream()? {
            self.processed += 1;
            if event.numeric_value().is_some() {
                self.left_anchor = Some(event.clone());
                self.queue.push_back(event);
                self.boundary = (self.processed / self.bin_size + 1) * self.bin_size;
                return Ok(());
            }
            self.queue.push_back(event);
        }
        self.finished = true;
        Ok(())
    }

    /// Sample the filled bucket against `right` and queue its output
    fn flush_bucket(&mut self, right: &Event) {
        let events = std::mem::take(&mut self.bucket);
        let bucket = EventBucket::with_neighbours(
            events,
            self.after_disconnection,
            right.is_disconnection(),
        );
        self.after_disconnection = bucket.ends_with_disconnection();

        let (representative, output) = match &self.left_anchor {
            Some(left) => bucket.into_output(left, right),
            None => return,
        };
        if representative.is_some() {
            self.left_anchor = representative;
        }
        self.queue.extend(output);
    }

    /// Advance the input until at least one bucket is flushed or input ends
    fn fill_queue(&mut self) -> Result<()> {
        if self.left_anchor.is_none() {
            return self.find_first_anchor();
        }

        loop {
            match self.upstream()? {
                Some(current) => {
                    if let Some(previous) = self.pending.take() {
                        self.bucket.push(previous);
                        self.processed += 1;
                        if self.processed == self.boundary {
                            self.boundary += self.bin_size;
                            self.flush_bucket(&current);
                            self.pending = Some(current);
                            return Ok(());
                        }
                    }
                    self.pending = Some(current);
                }
                None => {
                    if let Some(last) = self.pending.take() {
                        if !self.bucket.is_empty() {
                            self.flush_bucket(&last);
                        }
                        self.queue.push_back(last);
                    }
                    self.finished = true;
                    return Ok(());
                }
            }
        }
    }
}

impl EventCursor for LttbCursor {
    fn read(&mut self) -> Result<Option<Event>> {
        if !self.input.is_open() {
            return Ok(None);
        }
        if self.pass_through {
            return self.input.read();
        }
        if let Some(event) = self.queue.pop_front() {
            return Ok(Some(event));
        }
        if self.poisoned {
            return Err(CursorError::Poisoned(self.name()).into());
        }
        while self.queue.is_empty() && !self.finished {
            self.fill_queue()?;
        }
        Ok(self.queue.pop_front())
    }

    fn close(&mut self) -> Result<()> {
        if self.input.is_open() {
            tracing::debug!(cursor = self.name(), queued = self.queue.len(), "closing");
        }
        self.queue.clear();
        self.bucket.clear();
        self.pending = None;
        self.input.close()
    }

    fn is_open(&self) -> bool {
        self.input.is_open()
    }

    fn name(&self) -> &'static str {
        "Lttb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::stream::testing::{gap, timestamps, upd, MockCursor};
    use crate::stream::{read_all, ListCursor};
    use crate::types::Timestamp;
    use std::sync::atomic::Ordering;

    fn sample(events: Vec<Event>, num_bins: u64) -> Vec<Event> {
        let count = events.len() as u64;
        let params = GraphicalSamplerParams::new(num_bins, count).unwrap();
        let mut cursor = LttbCursor::new(Box::new(ListCursor::new(events)), params);
        read_all(&mut cursor).unwrap()
    }

    #[test]
    fn test_triangle_area_formula() {
        let area = triangle_area((0.0, 0.0), (1.0, 2.0), (2.0, 0.0));
        assert_eq!(area, 2.0);
        assert_eq!(triangle_area((0.0, 1.0), (1.0, 1.0), (2.0, 1.0)), 0.0);
    }

    #[test]
    fn test_calculate_triangle_area_seconds() {
        let a = upd(0, 0.0);
        let b = upd(1, 2.0);
        let c = upd(2, 0.0);
        assert_eq!(calculate_triangle_area(&a, &b, &c), Some(2.0));
        assert_eq!(calculate_triangle_area(&c, &b, &a), Some(2.0));
    }

    #[test]
    fn test_calculate_triangle_area_translation_invariant() {
        let offset = 1_600_000_000_000_000_000;
        let shift = |e: &Event| e.copy_to(e.timestamp().plus_nanos(offset));
        let a = upd(3, 1.5);
        let b = upd(7, -4.0);
        let c = upd(11, 2.25);
        assert_eq!(
            calculate_triangle_area(&a, &b, &c),
            calculate_triangle_area(&shift(&a), &shift(&b), &shift(&c))
        );
    }

    #[test]
    fn test_disconnected_anchor_borrows_value() {
        let left = upd(0, 1.0);
        let right = gap(2);
        // Right anchor takes y = 1.0, so the triangle is (0,1) (1,3) (2,1)
        assert_eq!(calculate_triangle_area(&left, &upd(1, 3.0), &right), Some(2.0));
        assert_eq!(calculate_triangle_area(&left, &gap(1), &right), None);
    }

    #[test]
    fn test_bucket_picks_largest_triangle() {
        let bucket = EventBucket::new(vec![upd(1, 0.5), upd(2, 9.0), upd(3, 1.0)]);
        let chosen = bucket.down_sample(&upd(0, 0.0), &upd(4, 0.0)).unwrap();
        assert_eq!(chosen.timestamp(), Timestamp::from_secs(2));
    }

    #[test]
    fn test_bucket_tie_goes_to_first() {
        let bucket = EventBucket::new(vec![upd(1, 5.0), upd(3, 5.0)]);
        // Symmetric about t=2: both triangles have the same area
        let chosen = bucket.down_sample(&upd(0, 0.0), &upd(4, 0.0)).unwrap();
        assert_eq!(chosen.timestamp(), Timestamp::from_secs(1));
    }

    #[test]
    fn test_bucket_forced_keep() {
        let bucket = EventBucket::new(vec![
            upd(1, 1.0),
            upd(2, 2.0),
            gap(3),
            upd(4, 3.0),
            upd(5, 100.0),
            upd(6, 4.0),
        ]);
        assert_eq!(
            bucket.forced_keep(),
            vec![false, true, true, true, false, false]
        );

        let (representative, output) = bucket.into_output(&upd(0, 0.0), &upd(7, 0.0));
        assert_eq!(representative.unwrap().timestamp(), Timestamp::from_secs(5));
        assert_eq!(timestamps(&output), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_calm_bucket_yields_single_representative() {
        let bucket = EventBucket::new(vec![upd(1, 1.0), upd(2, 5.0), upd(3, 2.0)]);
        assert!(bucket.forced_keep().iter().all(|keep| !keep));

        let (representative, output) = bucket.into_output(&upd(0, 0.0), &upd(4, 0.0));
        assert_eq!(output.len(), 1);
        assert_eq!(representative.as_ref(), output.first());
        assert_eq!(timestamps(&output), vec![2]);
    }

    #[test]
    fn test_bucket_neighbour_flags() {
        let bucket = EventBucket::with_neighbours(vec![upd(1, 1.0), upd(2, 2.0), upd(3, 3.0)], true, true);
        assert_eq!(bucket.forced_keep(), vec![true, false, true]);
        let (_, output) = bucket.into_output(&upd(0, 0.0), &gap(4));
        assert_eq!(timestamps(&output), vec![1, 2, 3]);
    }

    #[test]
    fn test_bucket_without_candidates_returns_last() {
        let bucket = EventBucket::new(vec![upd(1, 1.0), gap(2)]);
        let chosen = bucket.down_sample(&upd(0, 0.0), &upd(3, 0.0)).unwrap();
        assert_eq!(chosen.timestamp(), Timestamp::from_secs(2));

        let empty = EventBucket::new(Vec::new());
        assert!(empty.down_sample(&upd(0, 0.0), &upd(3, 0.0)).is_none());
    }

    #[test]
    fn test_pass_through_when_small() {
        let events: Vec<Event> = (0..5).map(|i| upd(i, i as f32)).collect();
        let out = sample(events.clone(), 10);
        assert_eq!(out, events);
    }

    #[test]
    fn test_calm_series_one_point_per_bucket() {
        // 12 events, 5 bins: bin size ceil(10 / 3) = 4
        let values = [0.0, 1.0, 8.0, 1.0, 0.0, 0.0, -6.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        let events: Vec<Event> = values
            .iter()
            .enumerate()
            .map(|(i, v)| upd(i as i64, *v))
            .collect();
        let out = sample(events, 5);
        let ts = timestamps(&out);
        assert_eq!(ts.first(), Some(&0));
        assert_eq!(ts.last(), Some(&11));
        assert!(ts.contains(&2), "spike kept: {:?}", ts);
        assert!(ts.contains(&6), "dip kept: {:?}", ts);
        assert!(out.len() <= 5, "{:?}", ts);
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_disconnections_survive_sampling() {
        let mut events: Vec<Event> = (0..40).map(|i| upd(i, (i % 7) as f32)).collect();
        events[13] = gap(13);
        events[27] = gap(27);
        let out = sample(events, 5);
        let ts = timestamps(&out);
        for required in [12, 13, 14, 26, 27, 28] {
            assert!(ts.contains(&required), "missing {} in {:?}", required, ts);
        }
        assert_eq!(ts.first(), Some(&0));
        assert_eq!(ts.last(), Some(&39));
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_leading_disconnections_emitted() {
        let mut events = vec![gap(0), gap(1)];
        events.extend((2..20).map(|i| upd(i, i as f32)));
        let out = sample(events, 4);
        assert_eq!(&timestamps(&out)[..3], &[0, 1, 2]);
    }

    #[test]
    fn test_close_propagates() {
        let events: Vec<Event> = (0..30).map(|i| upd(i, i as f32)).collect();
        let mock = MockCursor::new(events);
        let closes = mock.close_counter();
        let params = GraphicalSamplerParams::new(5, 30).unwrap();
        let mut cursor = LttbCursor::new(Box::new(mock), params);
        cursor.read().unwrap();
        cursor.close().unwrap();
        cursor.close().unwrap();
        assert!(cursor.read().unwrap().is_none());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_upstream_error_poisons() {
        let events: Vec<Event> = (0..30).map(|i| upd(i, i as f32)).collect();
        let mock = MockCursor::new(events).failing_after(3);
        let params = GraphicalSamplerParams::new(5, 30).unwrap();
        let mut cursor = LttbCursor::new(Box::new(mock), params);
        assert!(cursor.read().unwrap().is_some()); // first anchor
        assert!(matches!(cursor.read(), Err(Error::Cursor(CursorError::Upstream { .. }))));
        assert!(matches!(cursor.read(), Err(Error::Cursor(CursorError::Poisoned("Lttb")))));
    }
}
