//! pvhist - Streaming retrieval, statistics and downsampling of archived
//! process-variable history
//!
//! This library provides the client-side pipeline between an archive of
//! channel history and the code that plots or summarizes it:
//! - Single-pass, closeable event cursors composed by wrapping
//! - Time-weighted min/max/mean/sigma/RMS/integral that skip monitoring gaps
//! - Fixed-ratio bin sampling with an even spread of the remainder
//! - Largest-Triangle-Three-Buckets sampling that keeps every disconnection
//! - As-of joins of enumeration labels onto integer channels

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod event;
pub mod types;

/// Query and sampler parameter objects, validated on construction
pub mod params;

/// Configuration management with TOML support
pub mod config;

/// Time-weighted running statistics
pub mod stats;

/// Pull-based cursors and the sampling, join and analysis stages built on them
pub mod stream;

/// Archive connector and metadata lookup interfaces, plus an in-memory archive
pub mod source;

/// Pipeline composition over an archive connector
pub mod service;

// Re-export main types
pub use error::{Error, Result};
pub use event::{Event, EventCode, LabelChangeRecord, Value, ValueKind};
pub use service::HistoryService;
pub use stats::{RunningStatistics, Statistics};
pub use stream::{EventCursor, EventCursorExt};
pub use types::{TimeRange, Timestamp};
