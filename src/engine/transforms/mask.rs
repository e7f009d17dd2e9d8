//! Pattern-based masking of sensitive values.

use crate::engine::metrics::EngineMetrics;
use crate::engine::transforms::value_to_text;
use regex::Regex;
use serde_json::Value;

/// `mask` transform entry point. Nulls stay null, arrays recurse
/// element-wise, everything else is coerced to text and masked.
pub fn mask_value(value: Value, pattern: Option<&str>, custom_mask: Option<&str>) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    EngineMetrics::global().record_mask_call();
    mask_node(value, pattern.unwrap_or("partial"), custom_mask)
}

fn mask_node(value: Value, pattern: &str, custom_mask: Option<&str>) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|e| mask_node(e, pattern, custom_mask))
                .collect(),
        ),
        other => Value::String(mask(&value_to_text(&other), pattern, custom_mask)),
    }
}

/// Mask a text value with the named pattern. Pattern names are
/// case-insensitive; unknown names fall back to `partial`.
pub fn mask(value: &str, pattern: &str, custom_mask: Option<&str>) -> String {
    if value.is_empty() {
        return value.to_string();
    }
    match pattern.to_lowercase().as_str() {
        "ssn" => mask_ssn(value),
        "creditcard" | "credit_card" | "cc" => mask_credit_card(value),
        "email" => mask_email(value),
        "phone" => mask_phone(value),
        "name" => mask_name(value),
        "custom" => mask_custom(value, custom_mask),
        "full" => mask_full(value),
        _ => mask_partial(value),
    }
}

fn digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// `123-45-6789` → `***-**-6789`
fn mask_ssn(value: &str) -> String {
    let cleaned = digits(value);
    if cleaned.len() >= 4 {
        format!("***-**-{}", &cleaned[cleaned.len() - 4..])
    } else {
        "****".to_string()
    }
}

/// `4111111111111111` → `****-****-****-1111`
fn mask_credit_card(value: &str) -> String {
    let cleaned = digits(value);
    if cleaned.len() >= 12 {
        format!("****-****-****-{}", &cleaned[cleaned.len() - 4..])
    } else if cleaned.len() >= 4 {
        format!("****-{}", &cleaned[cleaned.len() - 4..])
    } else {
        "****".to_string()
    }
}

/// `john.doe@example.com` → `j***@example.com`
fn mask_email(value: &str) -> String {
    let Some(at_index) = value.find('@') else {
        return "****@****.***".to_string();
    };
    let local = &value[..at_index];
    let domain = &value[at_index..];
    let mut chars = local.chars();
    match chars.next() {
        Some(first) if chars.next().is_some() => format!("{first}***{domain}"),
        _ => format!("*{domain}"),
    }
}

/// `555-123-4567` → `***-***-4567`
fn mask_phone(value: &str) -> String {
    let cleaned = digits(value);
    if cleaned.len() >= 10 {
        format!("***-***-{}", &cleaned[cleaned.len() - 4..])
    } else if cleaned.len() >= 4 {
        format!("***-{}", &cleaned[cleaned.len() - 4..])
    } else {
        "****".to_string()
    }
}

/// `John Smith` → `J*** S***`
fn mask_name(value: &str) -> String {
    let masked: Vec<String> = value
        .split_whitespace()
        .filter_map(|token| token.chars().next().map(|first| format!("{first}***")))
        .collect();
    if masked.is_empty() {
        "****".to_string()
    } else {
        masked.join(" ")
    }
}

/// Custom regex replacement, configured as `regex|replacement`. Any failure
/// falls back to partial masking.
fn mask_custom(value: &str, custom_mask: Option<&str>) -> String {
    let Some(custom_mask) = custom_mask else {
        return mask_partial(value);
    };
    let Some((pattern, replacement)) = custom_mask.split_once('|') else {
        return mask_partial(value);
    };
    match Regex::new(pattern) {
        Ok(re) => re.replace_all(value, replacement).into_owned(),
        Err(_) => mask_partial(value),
    }
}

fn mask_full(value: &str) -> String {
    "*".repeat(value.chars().count().min(16))
}

/// First and last characters kept, middle starred; values shorter than three
/// characters are fully starred.
fn mask_partial(value: &str) -> String {
    let count = value.chars().count();
    if count <= 2 {
        return "*".repeat(count);
    }
    let first = value.chars().next().unwrap();
    let last = value.chars().last().unwrap();
    format!("{first}{}{last}", "*".repeat(count - 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ssn() {
        assert_eq!(mask("123-45-6789", "ssn", None), "***-**-6789");
        assert_eq!(mask("123456789", "ssn", None), "***-**-6789");
        assert_eq!(mask("123", "ssn", None), "****");
    }

    #[test]
    fn test_credit_card() {
        assert_eq!(
            mask("4111111111111111", "creditcard", None),
            "****-****-****-1111"
        );
        assert_eq!(
            mask("4111-1111-1111-1111", "credit_card", None),
            "****-****-****-1111"
        );
        assert_eq!(mask("12345678", "cc", None), "****-5678");
        assert_eq!(mask("12", "creditcard", None), "****");
    }

    #[test]
    fn test_email() {
        assert_eq!(mask("john.doe@example.com", "email", None), "j***@example.com");
        assert_eq!(mask("j@example.com", "email", None), "*@example.com");
        assert_eq!(mask("not-an-email", "email", None), "****@****.***");
    }

    #[test]
    fn test_phone() {
        assert_eq!(mask("555-123-4567", "phone", None), "***-***-4567");
        assert_eq!(mask("1234567", "phone", None), "***-4567");
        assert_eq!(mask("12", "phone", None), "****");
    }

    #[test]
    fn test_name() {
        assert_eq!(mask("John Smith", "name", None), "J*** S***");
        assert_eq!(mask("Cher", "name", None), "C***");
    }

    #[test]
    fn test_full() {
        assert_eq!(mask("secret", "full", None), "******");
        assert_eq!(mask(&"x".repeat(40), "full", None), "*".repeat(16));
    }

    #[test]
    fn test_partial() {
        assert_eq!(mask("sensitive", "partial", None), "s*******e");
        assert_eq!(mask("ab", "partial", None), "**");
        assert_eq!(mask("abc", "partial", None), "a*c");
    }

    #[test]
    fn test_unknown_pattern_falls_back_to_partial() {
        assert_eq!(mask("sensitive", "bogus", None), "s*******e");
    }

    #[test]
    fn test_custom() {
        assert_eq!(mask("abc123", "custom", Some(r"\d|#")), "abc###");
        // malformed custom configs fall back to partial
        assert_eq!(mask("abc123", "custom", Some("no-separator")), "a****3");
        assert_eq!(mask("abc123", "custom", Some("[|x")), "a****3");
        assert_eq!(mask("abc123", "custom", None), "a****3");
    }

    #[test]
    fn test_mask_value_shapes() {
        assert_eq!(mask_value(Value::Null, Some("ssn"), None), Value::Null);
        assert_eq!(
            mask_value(json!(["123-45-6789", null]), Some("ssn"), None),
            json!(["***-**-6789", null])
        );
        // non-text scalars are coerced to text first
        assert_eq!(
            mask_value(json!(123456789), Some("ssn"), None),
            json!("***-**-6789")
        );
        // missing pattern defaults to partial
        assert_eq!(mask_value(json!("sensitive"), None, None), json!("s*******e"));
    }
}
