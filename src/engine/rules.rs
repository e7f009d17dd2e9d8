//! Raw mapping-document model, as deserialized from `topic-mappings.json`.
//! Shape validation and template compilation happen in
//! [`crate::engine::validation`]; this module only mirrors the wire format.

use crate::engine::error::{ReshapeError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Top-level mapping rules document
#[derive(Debug, Clone, Deserialize)]
pub struct MappingRules {
    pub version: Option<i64>,
    #[serde(default)]
    pub topics: HashMap<String, TopicMapping>,
    #[serde(default)]
    pub connectors: HashMap<String, TopicMapping>,
}

/// One topic or connector mapping: a wrapper key plus an output template
#[derive(Debug, Clone, Deserialize)]
pub struct TopicMapping {
    pub root: String,
    pub output: Value,
}

/// A field-specification leaf of the output template
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub paths: Vec<String>,
    #[serde(default)]
    pub required: bool,
    pub multi: Option<String>,
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
}

/// A single transform descriptor in a field's pipeline.
///
/// Descriptor kinds are closed: unknown `type` values fail deserialization,
/// which the validator reports at adoption time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum TransformSpec {
    #[serde(rename = "toString")]
    ToString,

    #[serde(rename = "dateFormat", rename_all = "camelCase")]
    DateFormat {
        input_formats: Vec<String>,
        output_format: String,
        #[serde(default)]
        timezone: Option<String>,
    },

    #[serde(rename = "encrypt")]
    Encrypt {
        #[serde(default)]
        key: Option<String>,
    },

    #[serde(rename = "mask", rename_all = "camelCase")]
    Mask {
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default)]
        custom_mask: Option<String>,
    },
}

impl TransformSpec {
    /// Check descriptor invariants that the serde shape alone cannot express.
    pub fn validate(&self) -> Result<()> {
        if let TransformSpec::DateFormat {
            input_formats,
            output_format,
            ..
        } = self
        {
            if input_formats.is_empty() || input_formats.iter().any(|f| f.trim().is_empty()) {
                return Err(ReshapeError::Validation(
                    "dateFormat requires non-empty inputFormats".to_string(),
                ));
            }
            if output_format.trim().is_empty() {
                return Err(ReshapeError::Validation(
                    "dateFormat requires a non-empty outputFormat".to_string(),
                ));
            }
        }
        Ok(())
    }
}
