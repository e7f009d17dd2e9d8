use crate::engine::error::{ErrorInfo, ReshapeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single inbound record handed to the engine by the host pipeline.
///
/// The host owns delivery, ordering and offsets; the engine only needs the
/// topic (for mapping lookup and metadata), the partition (metadata), and the
/// payload.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub topic: String,
    pub partition: Option<i32>,
    pub timestamp: Option<i64>,
    pub payload: RecordPayload,
}

impl SourceRecord {
    pub fn new(topic: impl Into<String>, payload: RecordPayload) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            timestamp: None,
            payload,
        }
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// The payload shapes hosts deliver. Everything is coerced to a parsed JSON
/// tree before interpretation.
#[derive(Debug, Clone)]
pub enum RecordPayload {
    Bytes(Vec<u8>),
    Text(String),
    Json(Value),
}

impl RecordPayload {
    /// Parse the payload into a JSON tree. Invalid JSON is a per-record
    /// failure the host may route to a dead-letter sink.
    pub fn parse(&self) -> Result<Value> {
        match self {
            RecordPayload::Bytes(bytes) => serde_json::from_slice(bytes)
                .map_err(|e| ReshapeError::Parse(format!("invalid JSON payload: {e}"))),
            RecordPayload::Text(text) => serde_json::from_str(text)
                .map_err(|e| ReshapeError::Parse(format!("invalid JSON payload: {e}"))),
            RecordPayload::Json(value) => Ok(value.clone()),
        }
    }
}

/// Whether the projected object is placed under the mapping's `root` key or
/// emitted directly. Flat framing also suppresses the metadata and raw-payload
/// side-channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramingMode {
    Wrapped,
    Flat,
}

/// The engine's output for one record: the reshaped tree plus any structured
/// events raised while producing it.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub value: Value,
    pub errors: Vec<ErrorInfo>,
}

impl TransformOutput {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Outcome of processing one record through the engine.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// The mapping matched; hand the reshaped value to the sink adapter
    Transformed(TransformOutput),
    /// No mapping matched; the host passes the original record through
    /// unchanged. The event describes the miss for hosts that track or
    /// route such records.
    Unmapped(ErrorInfo),
}

impl ProcessOutcome {
    /// The reshaped output, when the mapping matched
    pub fn into_transformed(self) -> Option<TransformOutput> {
        match self {
            ProcessOutcome::Transformed(output) => Some(output),
            ProcessOutcome::Unmapped(_) => None,
        }
    }

    pub fn is_unmapped(&self) -> bool {
        matches!(self, ProcessOutcome::Unmapped(_))
    }
}
