//! # Path Engine
//!
//! Parses and evaluates path expressions against a JSON tree. The language is
//! a small JSONPath-like subset:
//!
//! - `member.name` - field access
//! - `items[0]` - positional index
//! - `items[*]` - wildcard over array elements
//! - `identifier[?(@.system == 'ssn')].value` - predicate-filtered selection,
//!   with up to two `&&`-joined equality predicates
//!
//! An optional `$.` root marker is stripped at parse time. Field access on an
//! array broadcasts to every element ("implicit projection"), so
//! `items.value` over an array of objects yields the array of their values.
//!
//! Evaluation never fails on absent data: a path that leads nowhere returns
//! `None`, which is distinct from a field holding an explicit JSON null.

use crate::engine::error::{ReshapeError, Result};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A single segment of a compiled path expression
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    /// Named field access
    Field(String),
    /// Positional array index
    Index(usize),
    /// All array elements
    Wildcard,
    /// Equality-predicate filter over array elements
    Filter(Vec<FilterPredicate>),
}

/// One `@.field == literal` predicate inside a filter segment
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPredicate {
    pub field: String,
    pub value: String,
}

/// Process-wide cache of compiled paths, keyed by the original path text.
/// Grows monotonically; bounded in practice by the number of distinct paths
/// in the mapping corpus.
static PATH_CACHE: Lazy<RwLock<HashMap<String, Arc<Vec<PathSegment>>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Compile a path expression, consulting the process-wide cache.
pub fn compile(path: &str) -> Result<Arc<Vec<PathSegment>>> {
    if let Some(hit) = PATH_CACHE.read().unwrap().get(path) {
        return Ok(Arc::clone(hit));
    }
    let segments = Arc::new(parse_path(path)?);
    // Duplicate computation under contention is fine; last writer wins.
    PATH_CACHE
        .write()
        .unwrap()
        .insert(path.to_string(), Arc::clone(&segments));
    Ok(segments)
}

/// Number of distinct compiled paths currently cached
pub fn cache_size() -> usize {
    PATH_CACHE.read().unwrap().len()
}

/// Drop all cached compiled paths. Intended for host teardown.
pub fn clear_cache() {
    PATH_CACHE.write().unwrap().clear();
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parse a path expression into segments. Numeric indices are accepted here;
/// rejecting them in template-declared paths is the validator's job.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    let clean = path.strip_prefix("$.").unwrap_or(path);
    let mut segments = Vec::new();
    let mut rest = clean;

    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix('.') {
            rest = stripped;
            continue;
        }

        if let Some(after_bracket) = rest.strip_prefix('[') {
            let close = after_bracket.find(']').ok_or_else(|| {
                ReshapeError::PathSyntax(format!("unclosed '[' in path: {path}"))
            })?;
            let inner = &after_bracket[..close];
            rest = &after_bracket[close + 1..];
            segments.push(parse_bracket(inner, path)?);
            continue;
        }

        let end = rest.find(|c: char| !is_word_char(c)).unwrap_or(rest.len());
        if end == 0 {
            return Err(ReshapeError::PathSyntax(format!(
                "unexpected character {:?} in path: {path}",
                rest.chars().next().unwrap()
            )));
        }
        segments.push(PathSegment::Field(rest[..end].to_string()));
        rest = &rest[end..];
    }

    if segments.is_empty() {
        return Err(ReshapeError::PathSyntax(format!("empty path: {path:?}")));
    }
    Ok(segments)
}

fn parse_bracket(inner: &str, path: &str) -> Result<PathSegment> {
    let trimmed = inner.trim();

    if let Some(predicate_body) = trimmed.strip_prefix("?(").and_then(|s| s.strip_suffix(')')) {
        let parts: Vec<&str> = predicate_body.split("&&").collect();
        if parts.is_empty() || parts.len() > 2 {
            return Err(ReshapeError::PathSyntax(format!(
                "filter supports one or two predicates, got {} in path: {path}",
                parts.len()
            )));
        }
        let predicates = parts
            .iter()
            .map(|p| parse_predicate(p, path))
            .collect::<Result<Vec<_>>>()?;
        return Ok(PathSegment::Filter(predicates));
    }

    if trimmed == "*" {
        return Ok(PathSegment::Wildcard);
    }

    trimmed
        .parse::<usize>()
        .map(PathSegment::Index)
        .map_err(|_| {
            ReshapeError::PathSyntax(format!("invalid bracket segment [{inner}] in path: {path}"))
        })
}

fn parse_predicate(text: &str, path: &str) -> Result<FilterPredicate> {
    let text = text.trim();
    let body = text.strip_prefix("@.").ok_or_else(|| {
        ReshapeError::PathSyntax(format!("predicate must start with '@.' in path: {path}"))
    })?;
    let (field, literal) = body.split_once("==").ok_or_else(|| {
        ReshapeError::PathSyntax(format!("predicate must use '==' in path: {path}"))
    })?;

    let field = field.trim();
    if field.is_empty() || !field.chars().all(is_word_char) {
        return Err(ReshapeError::PathSyntax(format!(
            "invalid predicate field {field:?} in path: {path}"
        )));
    }

    let mut literal = literal.trim();
    if literal.len() >= 2 && literal.starts_with('\'') && literal.ends_with('\'') {
        literal = &literal[1..literal.len() - 1];
    }

    Ok(FilterPredicate {
        field: field.to_string(),
        value: literal.to_string(),
    })
}

/// Evaluate a compiled path against a tree.
///
/// Returns `None` for "no such path" (missing), which is distinct from
/// `Some(Value::Null)` for a field that holds an explicit null. Never panics
/// on absent or shape-mismatched data.
pub fn evaluate(root: &Value, segments: &[PathSegment]) -> Option<Value> {
    let Some(segment) = segments.first() else {
        return Some(root.clone());
    };

    // Implicit projection: field access on an array broadcasts the same
    // segment (and everything after it) to each element.
    if root.is_array() && matches!(segment, PathSegment::Field(_)) {
        let elements = root.as_array().unwrap();
        let mut collected = Vec::new();
        for element in elements {
            collect(&mut collected, evaluate(element, segments));
        }
        return Some(Value::Array(collected));
    }

    match segment {
        PathSegment::Field(name) => match root.get(name.as_str()) {
            Some(child) => evaluate(child, &segments[1..]),
            None => None,
        },
        PathSegment::Index(idx) => match root.as_array().and_then(|arr| arr.get(*idx)) {
            Some(child) => evaluate(child, &segments[1..]),
            None => None,
        },
        PathSegment::Wildcard => {
            let elements = root.as_array()?;
            let mut collected = Vec::new();
            for element in elements {
                collect(&mut collected, evaluate(element, &segments[1..]));
            }
            Some(Value::Array(collected))
        }
        PathSegment::Filter(predicates) => {
            let elements = root.as_array()?;
            let retained: Vec<Value> = elements
                .iter()
                .filter(|e| predicates.iter().all(|p| matches_predicate(e, p)))
                .cloned()
                .collect();
            evaluate(&Value::Array(retained), &segments[1..])
        }
    }
}

/// Collection rule for broadcast results: skip missing and explicit null,
/// flatten exactly one level when the per-element result is itself an array.
fn collect(collector: &mut Vec<Value>, result: Option<Value>) {
    match result {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => collector.extend(items),
        Some(value) => collector.push(value),
    }
}

/// Predicate comparison is stringified equality, with `true`/`false` literals
/// (case-insensitive) requiring an actual boolean node. A numeric literal
/// like `42` matches a numeric node via its text form; no numeric semantics.
fn matches_predicate(element: &Value, predicate: &FilterPredicate) -> bool {
    let node = match element.get(predicate.field.as_str()) {
        Some(v) if !v.is_null() => v,
        _ => return false,
    };
    if predicate.value.eq_ignore_ascii_case("true") {
        return node.as_bool() == Some(true);
    }
    if predicate.value.eq_ignore_ascii_case("false") {
        return node.as_bool() == Some(false);
    }
    match node {
        Value::String(s) => *s == predicate.value,
        Value::Number(n) => n.to_string() == predicate.value,
        Value::Bool(b) => b.to_string() == predicate.value,
        _ => false,
    }
}
