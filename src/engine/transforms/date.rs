//! Multi-format date reformatting.
//!
//! Mapping documents declare `DateTimeFormatter`-style patterns (the wire
//! format the mapping corpus was written in, e.g. `yyyy-MM-dd'T'HH:mm:ss`).
//! Each pattern is converted once into a chrono strftime string and cached
//! process-wide.
//!
//! Parsing tries each input format in order: first as an instant (zoned or
//! local date-time), then as a calendar date. The order matters: date-only
//! patterns like `yyyy-MM-dd` only succeed on the calendar path.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use log::warn;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A Java-style date pattern converted to chrono's strftime dialect
#[derive(Debug, Clone)]
struct ConvertedPattern {
    fmt: String,
    /// Pattern used Java `X` tokens, which print `Z` at zero offset
    iso_offset: bool,
    /// Pattern carries an offset field, so text parses as a zoned instant
    has_offset: bool,
}

static PATTERN_CACHE: Lazy<RwLock<HashMap<String, Arc<ConvertedPattern>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn converted(pattern: &str) -> Arc<ConvertedPattern> {
    if let Some(hit) = PATTERN_CACHE.read().unwrap().get(pattern) {
        return Arc::clone(hit);
    }
    let converted = Arc::new(convert_pattern(pattern));
    PATTERN_CACHE
        .write()
        .unwrap()
        .insert(pattern.to_string(), Arc::clone(&converted));
    converted
}

/// Number of distinct converted date patterns currently cached
pub fn cache_size() -> usize {
    PATTERN_CACHE.read().unwrap().len()
}

/// Drop all cached patterns. Intended for host teardown.
pub fn clear_cache() {
    PATTERN_CACHE.write().unwrap().clear();
}

/// Translate a Java `DateTimeFormatter` pattern into a chrono format string.
/// Quoted literals (`'T'`) are unquoted; unknown letter runs pass through.
fn convert_pattern(pattern: &str) -> ConvertedPattern {
    let mut fmt = String::with_capacity(pattern.len() + 8);
    let mut iso_offset = false;
    let mut has_offset = false;

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if c == '\'' {
            // quoted literal; '' is an escaped quote
            if chars.get(i + 1) == Some(&'\'') {
                fmt.push('\'');
                i += 2;
                continue;
            }
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                if chars[i] == '%' {
                    fmt.push_str("%%");
                } else {
                    fmt.push(chars[i]);
                }
                i += 1;
            }
            i += 1;
            continue;
        }

        if c == '%' {
            fmt.push_str("%%");
            i += 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            fmt.push(c);
            i += 1;
            continue;
        }

        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        i += run;

        match c {
            'y' | 'Y' => fmt.push_str(if run == 2 { "%y" } else { "%Y" }),
            'M' => fmt.push_str(match run {
                3 => "%b",
                n if n >= 4 => "%B",
                _ => "%m",
            }),
            'd' => fmt.push_str("%d"),
            'H' => fmt.push_str("%H"),
            'h' => fmt.push_str("%I"),
            'm' => fmt.push_str("%M"),
            's' => fmt.push_str("%S"),
            'S' => fmt.push_str(match run {
                n if n >= 9 => "%9f",
                n if n >= 6 => "%6f",
                _ => "%3f",
            }),
            'a' => fmt.push_str("%p"),
            'E' => fmt.push_str(if run >= 4 { "%A" } else { "%a" }),
            'D' => fmt.push_str("%j"),
            'X' => {
                iso_offset = true;
                has_offset = true;
                fmt.push_str(if run >= 3 { "%:z" } else { "%z" });
            }
            'Z' => {
                has_offset = true;
                fmt.push_str("%z");
            }
            other => {
                // not a supported token; keep literally so a mismatch
                // surfaces as a parse failure rather than a panic
                for _ in 0..run {
                    fmt.push(other);
                }
            }
        }
    }

    ConvertedPattern {
        fmt,
        iso_offset,
        has_offset,
    }
}

/// `dateFormat` transform entry point. Nulls stay null, arrays recurse
/// element-wise, non-text values become null. A text value that matches no
/// input format also becomes null.
pub fn reformat(
    value: Value,
    input_formats: &[String],
    output_format: &str,
    timezone: Option<&str>,
) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|e| reformat(e, input_formats, output_format, timezone))
                .collect(),
        ),
        Value::String(text) => {
            let zone = resolve_zone(timezone);
            match reformat_text(&text, input_formats, output_format, zone) {
                Some(formatted) => Value::String(formatted),
                None => Value::Null,
            }
        }
        _ => Value::Null,
    }
}

fn resolve_zone(timezone: Option<&str>) -> Tz {
    let name = timezone.unwrap_or("UTC");
    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!("Unknown timezone {name:?}, falling back to UTC");
        chrono_tz::UTC
    })
}

fn reformat_text(
    text: &str,
    input_formats: &[String],
    output_format: &str,
    zone: Tz,
) -> Option<String> {
    let out = converted(output_format);
    for input_format in input_formats {
        let pattern = converted(input_format);

        if let Some(instant) = parse_instant(text, &pattern, zone) {
            return Some(format_instant(&instant, &out));
        }

        // Calendar fallback for date-only patterns; midnight in the
        // configured zone when the output needs time-of-day fields.
        if let Ok(date) = NaiveDate::parse_from_str(text, &pattern.fmt) {
            if let Some(instant) = date
                .and_hms_opt(0, 0, 0)
                .and_then(|midnight| zone.from_local_datetime(&midnight).earliest())
            {
                return Some(format_instant(&instant, &out));
            }
        }
    }
    None
}

fn parse_instant(text: &str, pattern: &ConvertedPattern, zone: Tz) -> Option<DateTime<Tz>> {
    if pattern.has_offset {
        // Java X tokens accept a literal Z for UTC; chrono's %:z does not
        let normalized = if pattern.iso_offset && text.ends_with('Z') {
            format!("{}+00:00", &text[..text.len() - 1])
        } else {
            text.to_string()
        };
        return DateTime::parse_from_str(&normalized, &pattern.fmt)
            .ok()
            .map(|dt| dt.with_timezone(&zone));
    }
    NaiveDateTime::parse_from_str(text, &pattern.fmt)
        .ok()
        .and_then(|naive| zone.from_local_datetime(&naive).earliest())
}

fn format_instant(instant: &DateTime<Tz>, pattern: &ConvertedPattern) -> String {
    let formatted = instant.format(&pattern.fmt).to_string();
    if pattern.iso_offset {
        // Java X tokens print Z at zero offset
        formatted.replace("+00:00", "Z").replace("+0000", "Z")
    } else {
        formatted
    }
}
