//! # Output Template
//!
//! The `output` value of a topic mapping is a recursive template. At adoption
//! time it is compiled into a tagged variant so the per-record interpreter
//! never re-inspects raw JSON shapes:
//!
//! - a map whose single key is `$array` emits an array of objects built from
//!   an array-typed source path;
//! - a map containing `paths` is a field-specification leaf;
//! - any other map is a nested object, projected entry by entry in declared
//!   key order.
//!
//! Compilation is also where template-level validation happens: every path is
//! parsed, numeric indices are rejected, `multi` and transform descriptors
//! are checked. A compiled template cannot fail structurally at
//! interpretation time.

use crate::engine::error::{codes, ErrorInfo, ReshapeError, Result};
use crate::engine::metrics::EngineMetrics;
use crate::engine::path::{self, PathSegment};
use crate::engine::rules::{FieldSpec, TransformSpec};
use crate::engine::transforms;
use log::error;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Multi-value normalization mode of a field specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Multi {
    /// Take the first element of an array-valued extraction (default)
    #[default]
    First,
    /// Keep arrays; wrap scalars into a single-element array
    Array,
}

/// A compiled field-specification leaf
#[derive(Debug, Clone)]
pub struct CompiledField {
    /// Candidate paths in declaration order; first non-missing, non-null wins
    pub paths: Vec<(String, Arc<Vec<PathSegment>>)>,
    pub required: bool,
    pub multi: Multi,
    pub transforms: Vec<TransformSpec>,
}

/// A compiled output template
#[derive(Debug, Clone)]
pub enum CompiledTemplate {
    /// Nested object; entries keep the declared key order
    Object(Vec<(String, CompiledTemplate)>),
    /// `$array` form: project `item` over each element selected by `path`
    Array {
        path_text: String,
        path: Arc<Vec<PathSegment>>,
        item: Box<CompiledTemplate>,
    },
    /// Field-specification leaf
    Field(CompiledField),
}

impl CompiledTemplate {
    /// Compile and validate a raw template value. `scope` names the owning
    /// topic/connector for error messages, `at` the position inside it.
    pub fn compile(node: &Value, scope: &str, at: &str) -> Result<CompiledTemplate> {
        let map = node.as_object().ok_or_else(|| {
            ReshapeError::Validation(format!(
                "{scope}: unsupported output node at {at} (expected an object)"
            ))
        })?;

        if map.len() == 1 && map.contains_key("$array") {
            return Self::compile_array(&map["$array"], scope, at);
        }

        if map.contains_key("paths") {
            return Self::compile_field(node, scope, at);
        }

        let mut entries = Vec::with_capacity(map.len());
        for (key, child) in map {
            let compiled = Self::compile(child, scope, &format!("{at}.{key}"))?;
            entries.push((key.clone(), compiled));
        }
        Ok(CompiledTemplate::Object(entries))
    }

    fn compile_array(spec: &Value, scope: &str, at: &str) -> Result<CompiledTemplate> {
        let map = spec.as_object().ok_or_else(|| {
            ReshapeError::Validation(format!("{scope}: $array must be an object at {at}"))
        })?;
        let path_text = map
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ReshapeError::Validation(format!("{scope}: $array.path missing at {at}"))
            })?
            .to_string();
        let path = compile_template_path(&path_text, scope, &format!("{at}.$array.path"))?;
        let item = map.get("item").ok_or_else(|| {
            ReshapeError::Validation(format!("{scope}: $array.item missing at {at}"))
        })?;
        let item = Self::compile(item, scope, &format!("{at}.$array.item"))?;
        Ok(CompiledTemplate::Array {
            path_text,
            path,
            item: Box::new(item),
        })
    }

    fn compile_field(node: &Value, scope: &str, at: &str) -> Result<CompiledTemplate> {
        let spec: FieldSpec = serde_json::from_value(node.clone()).map_err(|e| {
            ReshapeError::Validation(format!("{scope}: invalid field spec at {at}: {e}"))
        })?;
        if spec.paths.is_empty() {
            return Err(ReshapeError::Validation(format!(
                "{scope}: field spec needs at least one path at {at}"
            )));
        }

        let mut paths = Vec::with_capacity(spec.paths.len());
        for text in &spec.paths {
            let compiled = compile_template_path(text, scope, &format!("{at}.paths"))?;
            paths.push((text.clone(), compiled));
        }

        let multi = match spec.multi.as_deref() {
            None => Multi::First,
            Some(m) if m.eq_ignore_ascii_case("first") => Multi::First,
            Some(m) if m.eq_ignore_ascii_case("array") => Multi::Array,
            Some(other) => {
                return Err(ReshapeError::Validation(format!(
                    "{scope}: invalid multi={other} at {at}"
                )))
            }
        };

        for transform in &spec.transforms {
            transform.validate().map_err(|e| {
                ReshapeError::Validation(format!("{scope}: {e} at {at}.transforms"))
            })?;
        }

        Ok(CompiledTemplate::Field(CompiledField {
            paths,
            required: spec.required,
            multi,
            transforms: spec.transforms,
        }))
    }

    /// Project an input tree through this template, producing a fresh value.
    /// Structured events raised along the way are appended to `errors`.
    pub fn project(&self, root: &Value, topic: &str, errors: &mut Vec<ErrorInfo>) -> Value {
        match self {
            CompiledTemplate::Object(entries) => {
                let mut out = Map::with_capacity(entries.len());
                for (key, child) in entries {
                    let value = match child {
                        CompiledTemplate::Field(field) => field.extract(root, key, topic, errors),
                        nested => nested.project(root, topic, errors),
                    };
                    out.insert(key.clone(), value);
                }
                Value::Object(out)
            }
            CompiledTemplate::Array { path, item, .. } => {
                let mut out = Vec::new();
                match path::evaluate(root, path) {
                    None | Some(Value::Null) => {}
                    Some(Value::Array(elements)) => {
                        for element in &elements {
                            out.push(item.project(element, topic, errors));
                        }
                    }
                    Some(single) => out.push(item.project(&single, topic, errors)),
                }
                Value::Array(out)
            }
            CompiledTemplate::Field(field) => field.extract(root, "value", topic, errors),
        }
    }
}

impl CompiledField {
    fn extract(
        &self,
        root: &Value,
        field_name: &str,
        topic: &str,
        errors: &mut Vec<ErrorInfo>,
    ) -> Value {
        let mut read: Option<Value> = None;
        for (_, segments) in &self.paths {
            match path::evaluate(root, segments) {
                Some(value) if !value.is_null() => {
                    read = Some(value);
                    break;
                }
                _ => {}
            }
        }

        let normalized = match read {
            None => {
                if self.required {
                    self.report_required_miss(field_name, topic, errors);
                }
                Value::Null
            }
            Some(value) => match self.multi {
                Multi::Array => {
                    if value.is_array() {
                        value
                    } else {
                        Value::Array(vec![value])
                    }
                }
                Multi::First => {
                    if let Value::Array(items) = value {
                        match items.into_iter().next() {
                            Some(first) => first,
                            None => {
                                if self.required {
                                    self.report_required_miss(field_name, topic, errors);
                                }
                                Value::Null
                            }
                        }
                    } else {
                        value
                    }
                }
            },
        };

        if self.transforms.is_empty() {
            return normalized;
        }
        transforms::apply(normalized, &self.transforms, field_name, errors)
    }

    fn report_required_miss(&self, field_name: &str, topic: &str, errors: &mut Vec<ErrorInfo>) {
        let paths: Vec<&str> = self.paths.iter().map(|(t, _)| t.as_str()).collect();
        error!("Required field missing topic={topic} field={field_name} paths={paths:?}");
        EngineMetrics::global().record_required_field_miss();
        errors.push(
            ErrorInfo::new(
                codes::REQUIRED_FIELD_MISSING,
                format!("no candidate path matched for topic={topic} paths={paths:?}"),
            )
            .with_path(field_name),
        );
    }
}

fn compile_template_path(
    text: &str,
    scope: &str,
    at: &str,
) -> Result<Arc<Vec<PathSegment>>> {
    let segments = path::compile(text)
        .map_err(|e| ReshapeError::Validation(format!("{scope}: {e} at {at}")))?;
    if segments
        .iter()
        .any(|s| matches!(s, PathSegment::Index(_)))
    {
        return Err(ReshapeError::Validation(format!(
            "{scope}: numeric array index not allowed at {at} => {text}"
        )));
    }
    Ok(segments)
}
