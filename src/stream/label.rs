//! Temporal label join
//!
//! Attaches to each integer event the enumeration label valid at its
//! timestamp. The label history is a caller-owned, timestamp-ordered list of
//! [`LabelChangeRecord`]s. For an event at `t` the governing record is the
//! last one in the list with `timestamp <= t`; it supplies a label only if
//! it is an `"enum_strings"` record and the event value indexes into it.
//!
//! Events arrive in ascending order, so the search position only moves
//! forward and each record is passed at most once over the whole stream.

use super::EventCursor;
use crate::error::{ConfigError, Result};
use crate::event::{Event, LabelChangeRecord, Value};
use std::sync::Arc;

/// Cursor turning `Int` events into `LabeledInt` events
pub struct LabelJoinCursor {
    input: Box<dyn EventCursor>,
    labels: Option<Arc<[LabelChangeRecord]>>,
    /// Index of the last record at or before the previous event, if any
    position: Option<usize>,
}

impl LabelJoinCursor {
    /// Wrap `input` with a label history
    ///
    /// `None` means the channel has no label history and events pass
    /// through unlabeled. A history whose timestamps decrease is rejected.
    pub fn new(
        input: Box<dyn EventCursor>,
        labels: Option<Arc<[LabelChangeRecord]>>,
    ) -> std::result::Result<Self, ConfigError> {
        if let Some(records) = &labels {
            if let Some(pair) = records
                .windows(2)
                .find(|pair| pair[1].timestamp < pair[0].timestamp)
            {
                tracing::warn!(
                    earlier = %pair[0].timestamp,
                    later = %pair[1].timestamp,
                    "label history out of order"
                );
                return Err(ConfigError::InvalidOrdering {
                    field: "label_history".to_string(),
                    message: format!(
                        "record at {} follows record at {}",
                        pair[1].timestamp, pair[0].timestamp
                    ),
                });
            }
            tracing::debug!(records = records.len(), "label join opened");
        }
        Ok(Self {
            input,
            labels,
            position: None,
        })
    }

    /// Label valid for `value` at the event's timestamp
    fn find_label(&mut self, event: &Event, value: i32) -> Option<String> {
        let records = self.labels.as_deref()?;
        let t = event.timestamp();

        let mut next = self.position.map_or(0, |p| p + 1);
        while next < records.len() && records[next].timestamp <= t {
            self.position = Some(next);
            next += 1;
        }

        let record = &records[self.position?];
        if !record.is_enum_strings() {
            return None;
        }
        record.label(value).map(str::to_string)
    }

    fn join(&mut self, event: Event) -> Event {
        let value = match event.value() {
            Value::Int(v) => Some(*v),
            _ => None,
        };
        let Some(value) = value else {
            return event;
        };
        let label = if event.code().is_data() {
            self.find_label(&event, value)
        } else {
            None
        };
        event.with_value(Value::LabeledInt(value, label))
    }
}

impl EventCursor for LabelJoinCursor {
    fn read(&mut self) -> Result<Option<Event>> {
        Ok(self.input.read()?.map(|event| self.join(event)))
    }

    fn close(&mut self) -> Result<()> {
        self.input.close()
    }

    fn is_open(&self) -> bool {
        self.input.is_open()
    }

    fn name(&self) -> &'static str {
        "LabelJoin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventCode, ValueKind};
    use crate::stream::testing::MockCursor;
    use crate::stream::{read_all, ListCursor};
    use crate::types::Timestamp;
    use std::sync::atomic::Ordering;

    fn int(secs: i64, value: i32) -> Event {
        Event::int(Timestamp::from_secs(secs), value)
    }

    fn history() -> Arc<[LabelChangeRecord]> {
        Arc::from(vec![
            LabelChangeRecord::enum_strings(Timestamp::from_secs(10), &["OFF", "ON"]),
            LabelChangeRecord::enum_strings(Timestamp::from_secs(20), &["CLOSED", "OPEN", "MOVING"]),
        ])
    }

    fn labels_of(events: &[Event]) -> Vec<Option<String>> {
        events
            .iter()
            .map(|e| match e.value() {
                Value::LabeledInt(_, label) => label.clone(),
                other => panic!("unexpected value {:?}", other),
            })
            .collect()
    }

    fn join(events: Vec<Event>, labels: Option<Arc<[LabelChangeRecord]>>) -> Vec<Event> {
        let mut cursor = LabelJoinCursor::new(Box::new(ListCursor::new(events)), labels).unwrap();
        read_all(&mut cursor).unwrap()
    }

    #[test]
    fn test_as_of_join() {
        let out = join(
            vec![int(5, 1), int(10, 1), int(15, 0), int(20, 2), int(30, 1)],
            Some(history()),
        );
        assert_eq!(
            labels_of(&out),
            vec![
                None,
                Some("ON".to_string()),
                Some("OFF".to_string()),
                Some("MOVING".to_string()),
                Some("OPEN".to_string()),
            ]
        );
    }

    #[test]
    fn test_out_of_range_value_has_no_label() {
        let out = join(vec![int(12, 2), int(12, -1)], Some(history()));
        assert_eq!(labels_of(&out), vec![None, None]);
        assert_eq!(out[0].to_string().split(' ').last(), Some("2"));
    }

    #[test]
    fn test_absent_history_passes_through() {
        let out = join(vec![int(12, 1)], None);
        assert_eq!(out[0].value(), &Value::LabeledInt(1, None));
    }

    #[test]
    fn test_next_record_of_other_kind_hides_label() {
        let records: Arc<[LabelChangeRecord]> = Arc::from(vec![
            LabelChangeRecord::enum_strings(Timestamp::from_secs(10), &["OFF", "ON"]),
            LabelChangeRecord::new(Timestamp::from_secs(15), "notes", "maintenance"),
        ]);
        let out = join(vec![int(12, 1), int(16, 1)], Some(records));
        assert_eq!(labels_of(&out), vec![Some("ON".to_string()), None]);
    }

    #[test]
    fn test_same_timestamp_records_use_last() {
        let records: Arc<[LabelChangeRecord]> = Arc::from(vec![
            LabelChangeRecord::enum_strings(Timestamp::from_secs(10), &["A", "B"]),
            LabelChangeRecord::enum_strings(Timestamp::from_secs(10), &["C", "D"]),
        ]);
        let out = join(vec![int(10, 0)], Some(records));
        assert_eq!(labels_of(&out), vec![Some("C".to_string())]);
    }

    #[test]
    fn test_disconnections_and_other_values() {
        let gap = Event::disconnection(
            Timestamp::from_secs(12),
            EventCode::NetworkDisconnection,
            ValueKind::Int,
        );
        let float = Event::float(Timestamp::from_secs(13), 1.5);
        let out = join(vec![gap, float.clone()], Some(history()));
        assert_eq!(out[0].value(), &Value::LabeledInt(0, None));
        assert_eq!(out[0].code(), EventCode::NetworkDisconnection);
        assert_eq!(out[1], float);
    }

    #[test]
    fn test_descending_history_rejected() {
        let records: Arc<[LabelChangeRecord]> = Arc::from(vec![
            LabelChangeRecord::enum_strings(Timestamp::from_secs(20), &["A"]),
            LabelChangeRecord::enum_strings(Timestamp::from_secs(10), &["B"]),
        ]);
        let result = LabelJoinCursor::new(Box::new(ListCursor::empty()), Some(records));
        assert!(matches!(result, Err(ConfigError::InvalidOrdering { .. })));
    }

    #[test]
    fn test_close_propagates() {
        let mock = MockCursor::new(vec![int(1, 0)]);
        let closes = mock.close_counter();
        let mut cursor = LabelJoinCursor::new(Box::new(mock), Some(history())).unwrap();
        cursor.close().unwrap();
        cursor.close().unwrap();
        assert!(!cursor.is_open());
        assert!(cursor.read().unwrap().is_none());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
