//! Error types for history retrieval and stream processing

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Cursor (resource) error
    #[error("Cursor error: {0}")]
    Cursor(#[from] CursorError),

    /// Configuration error, raised while a pipeline is being built
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Backing store error
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether this error was raised before any event was read
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Cursor errors
///
/// Raised by `read` or `close` when the underlying resource misbehaves.
/// Reading a closed cursor is not an error, it yields the end-marker.
#[derive(Error, Debug)]
pub enum CursorError {
    /// The upstream resource failed while producing the next event
    #[error("Upstream read failed in {cursor}: {message}")]
    Upstream {
        /// Name of the cursor reporting the failure
        cursor: &'static str,
        /// Description of the failure
        message: String,
    },

    /// Releasing the underlying resource failed
    #[error("Close failed in {cursor}: {message}")]
    Close {
        /// Name of the cursor reporting the failure
        cursor: &'static str,
        /// Description of the failure
        message: String,
    },

    /// A previous read failed and the cursor cannot make further progress
    #[error("Cursor {0} is poisoned by an earlier read error")]
    Poisoned(&'static str),
}

/// Configuration errors
///
/// Every sampler and query parameter object is validated when it is built,
/// so these never surface in the middle of a stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Value is out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Field name being validated
        field: String,
        /// The invalid value
        value: String,
        /// Minimum allowed value
        min: String,
        /// Maximum allowed value
        max: String,
    },

    /// Required field is missing
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Records that must be ascending are not
    #[error("Invalid ordering for {field}: {message}")]
    InvalidOrdering {
        /// Field name being validated
        field: String,
        /// Description of the ordering problem
        message: String,
    },

    /// Invalid format
    #[error("Invalid format for {field}: {message}")]
    InvalidFormat {
        /// Field name being validated
        field: String,
        /// Description of the format error
        message: String,
    },
}

impl ConfigError {
    /// Build an `OutOfRange` error from displayable bounds
    pub fn out_of_range(
        field: &str,
        value: impl ToString,
        min: impl ToString,
        max: impl ToString,
    ) -> Self {
        ConfigError::OutOfRange {
            field: field.to_string(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }
}

/// Errors reported by the backing-store connector or metadata lookup
#[derive(Error, Debug)]
pub enum SourceError {
    /// Channel name could not be resolved
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// Backing store could not be reached
    #[error("Archive unreachable: {0}")]
    Unreachable(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
