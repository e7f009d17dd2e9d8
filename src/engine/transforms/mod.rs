//! # Transform Pipeline
//!
//! Ordered per-field value transforms. Each step consumes the previous step's
//! output. Transform failures degrade to null or to the pre-transform value
//! with a structured event; they never abort the record.

use crate::engine::error::ErrorInfo;
use crate::engine::rules::TransformSpec;
use serde_json::Value;

pub mod crypto;
pub mod date;
pub mod mask;

pub use crypto::EncryptionHelper;

/// Apply a field's transform pipeline left to right.
pub fn apply(
    mut value: Value,
    transforms: &[TransformSpec],
    field_name: &str,
    errors: &mut Vec<ErrorInfo>,
) -> Value {
    for transform in transforms {
        value = match transform {
            TransformSpec::ToString => to_string_value(value),
            TransformSpec::DateFormat {
                input_formats,
                output_format,
                timezone,
            } => date::reformat(value, input_formats, output_format, timezone.as_deref()),
            TransformSpec::Encrypt { key } => {
                crypto::encrypt_value(value, key.as_deref(), field_name, errors)
            }
            TransformSpec::Mask {
                pattern,
                custom_mask,
            } => mask::mask_value(value, pattern.as_deref(), custom_mask.as_deref()),
        };
    }
    value
}

/// `toString`: nulls stay null, arrays recurse element-wise, text is
/// identity, numbers and booleans take their canonical text form, anything
/// else its compact JSON form.
pub fn to_string_value(value: Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Array(items) => Value::Array(items.into_iter().map(to_string_value).collect()),
        Value::String(_) => value,
        Value::Number(n) => Value::String(n.to_string()),
        Value::Bool(b) => Value::String(b.to_string()),
        other => Value::String(other.to_string()),
    }
}

/// Text coercion used by encrypt and mask on non-text scalars.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
