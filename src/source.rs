//! Backing-store interfaces
//!
//! The archive connector and the metadata lookup are external collaborators.
//! The library only depends on the traits below. [`MemoryArchive`]
//! implements both over in-process data for tests and demos.

use crate::error::{ConfigError, Result, SourceError};
use crate::event::{Event, LabelChangeRecord, ValueKind};
use crate::params::{ChannelInfo, IntervalQuery, PointQuery};
use crate::stream::{EventCursor, ListCursor};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ============================================================================
// Traits
// ============================================================================

/// Range, point and count queries against the archive
pub trait ArchiveConnector: Send + Sync {
    /// Events in `[begin, end)` in ascending order, without duplicates
    fn open_cursor(&self, query: &IntervalQuery) -> Result<Box<dyn EventCursor>>;

    /// Number of events `open_cursor` would yield for the same query
    fn count(&self, query: &IntervalQuery) -> Result<u64>;

    /// Single event nearest to an instant in the requested direction
    fn find_point_near(&self, query: &PointQuery) -> Result<Option<Event>>;

    /// Label-change history of a channel, oldest first
    fn label_history(&self, channel: &ChannelInfo) -> Result<Option<Arc<[LabelChangeRecord]>>> {
        let _ = channel;
        Ok(None)
    }
}

/// Channel name resolution
pub trait MetadataLookup: Send + Sync {
    /// Resolve a channel name to its identity
    fn resolve(&self, name: &str) -> Result<ChannelInfo>;
}

// ============================================================================
// In-Memory Archive
// ============================================================================

struct ChannelData {
    info: ChannelInfo,
    events: Vec<Event>,
    labels: Vec<LabelChangeRecord>,
}

/// In-process archive holding every channel's history in memory
///
/// Safe to share between threads; readers take a shared lock and receive
/// their own copy of the matching events.
#[derive(Default)]
pub struct MemoryArchive {
    channels: RwLock<Vec<ChannelData>>,
    unreachable: AtomicBool,
}

impl MemoryArchive {
    /// Create an empty archive
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel, returning its identity
    ///
    /// Registering an existing name returns the existing identity.
    pub fn add_channel(&self, name: &str, kind: ValueKind) -> ChannelInfo {
        let mut channels = self.channels.write();
        if let Some(existing) = channels.iter().find(|c| c.info.name == name) {
            return existing.info.clone();
        }
        let id = u32::try_from(channels.len() + 1).unwrap_or(u32::MAX);
        let info = ChannelInfo::new(id, name, kind);
        channels.push(ChannelData {
            info: info.clone(),
            events: Vec::new(),
            labels: Vec::new(),
        });
        tracing::debug!(channel = %info, "channel registered");
        info
    }

    /// Append events to a channel's history
    ///
    /// Events must continue the history in non-decreasing timestamp order.
    pub fn append(
        &self,
        channel: &ChannelInfo,
        events: impl IntoIterator<Item = Event>,
    ) -> Result<()> {
        let mut channels = self.channels.write();
        let data = find_mut(&mut channels, channel)?;
        for event in events {
            if let Some(last) = data.events.last() {
                if event.timestamp() < last.timestamp() {
                    return Err(ConfigError::InvalidOrdering {
                        field: "events".to_string(),
                        message: format!(
                            "event at {} precedes {} in {}",
                            event.timestamp(),
                            last.timestamp(),
                            channel
                        ),
                    }
                    .into());
                }
            }
            data.events.push(event);
        }
        Ok(())
    }

    /// Append a label-change record to a channel
    pub fn add_label_record(&self, channel: &ChannelInfo, record: LabelChangeRecord) -> Result<()> {
        let mut channels = self.channels.write();
        let data = find_mut(&mut channels, channel)?;
        if let Some(last) = data.labels.last() {
            if record.timestamp < last.timestamp {
                return Err(ConfigError::InvalidOrdering {
                    field: "label_history".to_string(),
                    message: format!("record at {} precedes {}", record.timestamp, last.timestamp),
                }
                .into());
            }
        }
        data.labels.push(record);
        Ok(())
    }

    /// Simulate losing the connection to the archive
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SourceError::Unreachable("memory archive offline".to_string()).into());
        }
        Ok(())
    }

    fn matching(&self, query: &IntervalQuery) -> Result<Vec<Event>> {
        self.check_reachable()?;
        let channels = self.channels.read();
        let data = find(&channels, &query.channel)?;
        let start = data
            .events
            .partition_point(|e| e.timestamp() < query.begin());
        Ok(data.events[start..]
            .iter()
            .take_while(|e| e.timestamp() < query.end())
            .filter(|e| !query.updates_only || e.code().is_data())
            .cloned()
            .collect())
    }
}

fn find<'a>(channels: &'a [ChannelData], channel: &ChannelInfo) -> Result<&'a ChannelData> {
    channels
        .iter()
        .find(|c| c.info.id == channel.id)
        .ok_or_else(|| SourceError::ChannelNotFound(channel.name.clone()).into())
}

fn find_mut<'a>(
    channels: &'a mut [ChannelData],
    channel: &ChannelInfo,
) -> Result<&'a mut ChannelData> {
    channels
        .iter_mut()
        .find(|c| c.info.id == channel.id)
        .ok_or_else(|| SourceError::ChannelNotFound(channel.name.clone()).into())
}

impl ArchiveConnector for MemoryArchive {
    fn open_cursor(&self, query: &IntervalQuery) -> Result<Box<dyn EventCursor>> {
        let events = self.matching(query)?;
        tracing::debug!(
            channel = %query.channel,
            range = %query.range,
            events = events.len(),
            "cursor opened"
        );
        Ok(Box::new(ListCursor::new(events)))
    }

    fn count(&self, query: &IntervalQuery) -> Result<u64> {
        Ok(self.matching(query)?.len() as u64)
    }

    fn find_point_near(&self, query: &PointQuery) -> Result<Option<Event>> {
        self.check_reachable()?;
        let channels = self.channels.read();
        let data = find(&channels, &query.channel)?;
        let eligible = |e: &&Event| {
            query.direction.accepts(e.timestamp(), query.timestamp)
                && (!query.updates_only || e.code().is_data())
        };
        let found = if query.direction.is_backward() {
            data.events.iter().rev().find(eligible)
        } else {
            data.events.iter().find(eligible)
        };
        Ok(found.cloned())
    }

    fn label_history(&self, channel: &ChannelInfo) -> Result<Option<Arc<[LabelChangeRecord]>>> {
        self.check_reachable()?;
        let channels = self.channels.read();
        let data = find(&channels, channel)?;
        if data.labels.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Arc::from(data.labels.clone())))
        }
    }
}

impl MetadataLookup for MemoryArchive {
    fn resolve(&self, name: &str) -> Result<ChannelInfo> {
        self.channels
            .read()
            .iter()
            .find(|c| c.info.name == name)
            .map(|c| c.info.clone())
            .ok_or_else(|| SourceError::ChannelNotFound(name.to_string()).into())
    }
}
