//! Event model for archived channel history
//!
//! An [`Event`] is an immutable record of `(timestamp, code, value)`. The
//! [`EventCode`] says whether the record carries live data or marks a gap in
//! monitoring (a disconnection), and the [`Value`] is a closed set of payload
//! types. Only numeric payloads take part in statistics and triangle-area
//! sampling; see [`Event::numeric_value`].
//!
//! [`LabelChangeRecord`] holds versioned channel annotations. The one the
//! library acts on is `"enum_strings"`, whose value lists the labels of an
//! enumerated channel from its timestamp until the next record.

use crate::error::ConfigError;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Event Codes
// ============================================================================

/// Archive event status codes
///
/// Every code is either a data code or a disconnection code, never both.
/// The partition is decided by [`EventCode::is_disconnection`] alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCode {
    /// Normal channel data point
    Update,
    /// Network disconnection
    NetworkDisconnection,
    /// Archiving of channel turned off
    ArchivingOff,
    /// Archiver shutdown
    ArchiverShutdown,
    /// Unknown unavailability
    UnknownUnavailability,
    /// NaN or infinity encountered
    NanOrInfinity,
    /// Origin of the channel's history
    OriginOfHistory,
    /// Channel's prior data moved offline
    PriorDataMovedOffline,
    /// Channel's prior data discarded
    PriorDataDiscarded,
    /// Undefined; used for synthesized samples with no backing data
    Undefined,
}

impl EventCode {
    /// All codes, in numeric order
    pub const ALL: [EventCode; 10] = [
        EventCode::Update,
        EventCode::NetworkDisconnection,
        EventCode::ArchivingOff,
        EventCode::ArchiverShutdown,
        EventCode::UnknownUnavailability,
        EventCode::NanOrInfinity,
        EventCode::OriginOfHistory,
        EventCode::PriorDataMovedOffline,
        EventCode::PriorDataDiscarded,
        EventCode::Undefined,
    ];

    /// Whether this code marks a gap in monitoring
    #[inline]
    pub const fn is_disconnection(self) -> bool {
        matches!(
            self,
            EventCode::NetworkDisconnection
                | EventCode::ArchivingOff
                | EventCode::ArchiverShutdown
                | EventCode::UnknownUnavailability
        )
    }

    /// Whether this code carries a meaningful payload
    #[inline]
    pub const fn is_data(self) -> bool {
        !self.is_disconnection()
    }

    /// Numeric code as stored in the archive
    pub const fn number(self) -> u32 {
        match self {
            EventCode::Update => 0,
            EventCode::NetworkDisconnection => 1,
            EventCode::ArchivingOff => 2,
            EventCode::ArchiverShutdown => 3,
            EventCode::UnknownUnavailability => 4,
            EventCode::NanOrInfinity => 5,
            EventCode::OriginOfHistory => 16,
            EventCode::PriorDataMovedOffline => 32,
            EventCode::PriorDataDiscarded => 48,
            EventCode::Undefined => 128,
        }
    }

    /// Human-readable description, matching the archive's command line tools
    pub const fn description(self) -> &'static str {
        match self {
            EventCode::Update => "Normal channel data point",
            EventCode::NetworkDisconnection => "Network disconnection",
            EventCode::ArchivingOff => "Archiving of channel turned off",
            EventCode::ArchiverShutdown => "Archiver shutdown",
            EventCode::UnknownUnavailability => "Unknown unavailability",
            EventCode::NanOrInfinity => "NaN/infinity encountered",
            EventCode::OriginOfHistory => "Origin of channel's history",
            EventCode::PriorDataMovedOffline => "Channel's prior data moved offline",
            EventCode::PriorDataDiscarded => "Channel's prior data discarded",
            EventCode::Undefined => "undefined",
        }
    }

    /// Decode a numeric code as found in the archive
    pub fn from_number(number: u32) -> Result<Self, ConfigError> {
        EventCode::ALL
            .into_iter()
            .find(|code| code.number() == number)
            .ok_or_else(|| ConfigError::InvalidFormat {
                field: "event_code".to_string(),
                message: format!("unknown code number {}", number),
            })
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

// ============================================================================
// Values
// ============================================================================

/// Payload type of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Scalar 32-bit float
    Float,
    /// Scalar 32-bit integer
    Int,
    /// Vector or non-scalar channel, rendered as strings
    MultiString,
    /// Enumerated integer with an optional label
    LabeledInt,
}

/// Event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Scalar float
    Float(f32),
    /// Scalar integer
    Int(i32),
    /// Sequence of strings
    MultiString(Vec<String>),
    /// Enumerated integer and the label valid at the event's timestamp
    LabeledInt(i32, Option<String>),
}

impl Value {
    /// The payload type
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Float(_) => ValueKind::Float,
            Value::Int(_) => ValueKind::Int,
            Value::MultiString(_) => ValueKind::MultiString,
            Value::LabeledInt(..) => ValueKind::LabeledInt,
        }
    }

    /// The zero/empty payload of a kind
    pub fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Float => Value::Float(0.0),
            ValueKind::Int => Value::Int(0),
            ValueKind::MultiString => Value::MultiString(Vec::new()),
            ValueKind::LabeledInt => Value::LabeledInt(0, None),
        }
    }

    /// Numeric view of the payload, `None` for non-numeric variants
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Int(v) | Value::LabeledInt(v, _) => Some(f64::from(*v)),
            Value::MultiString(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::MultiString(items) => write!(f, "{}", items.join(" ")),
            Value::LabeledInt(_, Some(label)) => f.write_str(label),
            Value::LabeledInt(v, None) => write!(f, "{}", v),
        }
    }
}

// ============================================================================
// Event
// ============================================================================

/// A single archived history record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    timestamp: Timestamp,
    code: EventCode,
    value: Value,
}

impl Event {
    /// Create a new event
    pub fn new(timestamp: Timestamp, code: EventCode, value: Value) -> Self {
        Self {
            timestamp,
            code,
            value,
        }
    }

    /// Float update event
    pub fn float(timestamp: Timestamp, value: f32) -> Self {
        Self::new(timestamp, EventCode::Update, Value::Float(value))
    }

    /// Integer update event
    pub fn int(timestamp: Timestamp, value: i32) -> Self {
        Self::new(timestamp, EventCode::Update, Value::Int(value))
    }

    /// Disconnection-coded event with a zero payload of the given kind
    pub fn disconnection(timestamp: Timestamp, code: EventCode, kind: ValueKind) -> Self {
        debug_assert!(code.is_disconnection());
        Self::new(timestamp, code, Value::zero(kind))
    }

    /// Placeholder for a sample with no backing data
    pub fn undefined(timestamp: Timestamp, kind: ValueKind) -> Self {
        Self::new(timestamp, EventCode::Undefined, Value::zero(kind))
    }

    /// Event timestamp
    #[inline]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Event code
    #[inline]
    pub fn code(&self) -> EventCode {
        self.code
    }

    /// Event payload
    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consume the event, returning its payload
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Whether the event marks a gap in monitoring
    #[inline]
    pub fn is_disconnection(&self) -> bool {
        self.code.is_disconnection()
    }

    /// Finite numeric payload of a data event
    ///
    /// Returns `None` for disconnections, non-numeric payloads and NaN or
    /// infinite values. Aggregation treats `None` as a malformed payload and
    /// skips it; read-oriented cursors still pass the event through.
    #[inline]
    pub fn numeric_value(&self) -> Option<f64> {
        if self.code.is_disconnection() {
            return None;
        }
        self.value.as_f64().filter(|v| v.is_finite())
    }

    /// Copy of this event moved to another instant
    pub fn copy_to(&self, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            code: self.code,
            value: self.value.clone(),
        }
    }

    /// Same timestamp and code with a new payload
    pub fn with_value(&self, value: Value) -> Self {
        Self {
            timestamp: self.timestamp,
            code: self.code,
            value,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_data() {
            write!(f, "{} {}", self.timestamp, self.value)
        } else {
            write!(f, "{} <{}>", self.timestamp, self.code.description())
        }
    }
}

// ============================================================================
// Label Change Records
// ============================================================================

/// Kind tag of the label-change records that carry enumeration labels
pub const ENUM_STRINGS: &str = "enum_strings";

/// Versioned channel annotation valid from its timestamp onward
///
/// For `"enum_strings"` records the raw value is a NUL-separated list of
/// labels indexed by the channel's integer value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelChangeRecord {
    /// Instant from which the record applies
    pub timestamp: Timestamp,
    /// Record kind, e.g. `"enum_strings"` or `"notes"`
    pub kind: String,
    /// Raw record value
    pub value: String,
}

impl LabelChangeRecord {
    /// Create a record of any kind
    pub fn new(timestamp: Timestamp, kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind: kind.into(),
            value: value.into(),
        }
    }

    /// Create an `"enum_strings"` record from a list of labels
    pub fn enum_strings<S: AsRef<str>>(timestamp: Timestamp, labels: &[S]) -> Self {
        let value = labels
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("\u{0}");
        Self::new(timestamp, ENUM_STRINGS, value)
    }

    /// Whether this record carries enumeration labels
    #[inline]
    pub fn is_enum_strings(&self) -> bool {
        self.kind == ENUM_STRINGS
    }

    /// The raw value split on the NUL character
    pub fn labels(&self) -> Vec<&str> {
        self.value.split('\u{0}').collect()
    }

    /// Label at `index`, if the index is valid
    pub fn label(&self, index: i32) -> Option<&str> {
        let index = usize::try_from(index).ok()?;
        self.value.split('\u{0}').nth(index)
    }
}
