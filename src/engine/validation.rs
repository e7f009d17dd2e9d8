//! Mapping-document validation and compilation.
//!
//! A mapping document is only ever adopted whole: parse, validate every
//! mapping, compile every template, then hand the result to the store.
//! Partial adoption is impossible by construction.

use crate::engine::error::{ReshapeError, Result};
use crate::engine::rules::MappingRules;
use crate::engine::template::CompiledTemplate;
use std::collections::HashMap;

/// A fully validated, compiled mapping rules document
#[derive(Debug)]
pub struct CompiledRules {
    pub version: Option<i64>,
    topics: HashMap<String, CompiledMapping>,
    connectors: HashMap<String, CompiledMapping>,
}

/// One compiled topic/connector mapping
#[derive(Debug)]
pub struct CompiledMapping {
    pub root: String,
    pub output: CompiledTemplate,
}

impl CompiledRules {
    /// Parse and compile a mapping document from JSON text.
    pub fn parse(text: &str) -> Result<Self> {
        let rules: MappingRules = serde_json::from_str(text)
            .map_err(|e| ReshapeError::Validation(format!("invalid mapping document: {e}")))?;
        Self::compile(rules)
    }

    /// Validate and compile an already-deserialized document.
    pub fn compile(rules: MappingRules) -> Result<Self> {
        if rules.topics.is_empty() && rules.connectors.is_empty() {
            return Err(ReshapeError::Validation(
                "mapping rules must define at least 'topics' or 'connectors'".to_string(),
            ));
        }

        let topics = compile_group(&rules.topics, "topic")?;
        let connectors = compile_group(&rules.connectors, "connector")?;

        Ok(Self {
            version: rules.version,
            topics,
            connectors,
        })
    }

    /// Look up the mapping for a record: a non-empty connector name wins,
    /// then the topic, otherwise a miss.
    pub fn lookup(&self, connector_name: &str, topic: &str) -> Option<&CompiledMapping> {
        if !connector_name.is_empty() {
            if let Some(mapping) = self.connectors.get(connector_name) {
                return Some(mapping);
            }
        }
        self.topics.get(topic)
    }

    /// Names of all connector mappings in this document
    pub fn connector_names(&self) -> Vec<&str> {
        self.connectors.keys().map(String::as_str).collect()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn connector_count(&self) -> usize {
        self.connectors.len()
    }
}

fn compile_group(
    group: &HashMap<String, crate::engine::rules::TopicMapping>,
    kind: &str,
) -> Result<HashMap<String, CompiledMapping>> {
    let mut compiled = HashMap::with_capacity(group.len());
    for (key, mapping) in group {
        if mapping.root.trim().is_empty() {
            return Err(ReshapeError::Validation(format!(
                "missing 'root' for {kind}: {key}"
            )));
        }
        let output = CompiledTemplate::compile(&mapping.output, key, "output")?;
        compiled.insert(
            key.clone(),
            CompiledMapping {
                root: mapping.root.clone(),
                output,
            },
        );
    }
    Ok(compiled)
}
