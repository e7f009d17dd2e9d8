use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the reshape engine
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReshapeError {
    /// Invalid JSON payload on the per-record path
    #[error("Parse error: {0}")]
    Parse(String),

    /// Mapping document failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Path expression could not be parsed
    #[error("Path syntax error: {0}")]
    PathSyntax(String),

    /// A field transform could not be applied
    #[error("Transform error: {0}")]
    Transform(String),

    /// Output template produced a structurally unusable value at
    /// interpretation time
    #[error("Template error: {0}")]
    Template(String),

    /// Mapping source I/O errors (file reads, object store fetches)
    #[error("Source error: {0}")]
    Source(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Reload protocol errors
    #[error("Reload error: {0}")]
    Reload(String),

    /// Engine configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReshapeError {
    /// Determines if this error is worth retrying.
    ///
    /// Source and timeout errors are typically transient infrastructure
    /// failures; everything else is a data or configuration problem that will
    /// fail the same way on every attempt.
    pub fn retryable(&self) -> bool {
        matches!(self, ReshapeError::Source(_) | ReshapeError::Timeout(_))
    }
}

impl From<std::io::Error> for ReshapeError {
    fn from(err: std::io::Error) -> Self {
        ReshapeError::Source(err.to_string())
    }
}

impl From<object_store::Error> for ReshapeError {
    fn from(err: object_store::Error) -> Self {
        ReshapeError::Source(err.to_string())
    }
}

/// Type alias for Result with ReshapeError
pub type Result<T> = std::result::Result<T, ReshapeError>;

/// Event codes used in structured per-record events
pub mod codes {
    pub const PARSE_ERROR: &str = "PARSE_ERROR";
    pub const MAPPING_MISS: &str = "MAPPING_MISS";
    pub const REQUIRED_FIELD_MISSING: &str = "REQUIRED_FIELD_MISSING";
    pub const TRANSFORM_ERROR: &str = "TRANSFORM_ERROR";
    pub const TEMPLATE_ERROR: &str = "TEMPLATE_ERROR";
    pub const RELOAD_ERROR: &str = "RELOAD_ERROR";
}

/// Structured event attached to a record when something soft-failed while
/// processing it. Events never abort the record; they travel with the output
/// so the host can surface or route them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    /// Event code (e.g. "REQUIRED_FIELD_MISSING", "TRANSFORM_ERROR")
    pub code: String,

    /// Human-readable message
    pub message: String,

    /// Output field the event refers to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Timestamp when the event was recorded
    pub timestamp: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            path: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Attach the output field path the event refers to
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// A per-record structured failure: the error that aborted the record plus
/// the event for the host to attach when routing it to a dead-letter sink.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    pub error: ReshapeError,
    pub event: ErrorInfo,
}

impl RecordFailure {
    pub fn new(error: ReshapeError, code: &str) -> Self {
        let event = ErrorInfo::new(code, error.to_string());
        Self { error, event }
    }
}

impl std::fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for RecordFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
