pub mod config;
pub mod error;
pub mod metrics;
pub mod path;
pub mod record;
pub mod reload;
pub mod retry;
pub mod rules;
pub mod source;
pub mod store;
pub mod template;
pub mod transforms;
pub mod validation;

// Re-export key types for easier access
pub use config::EngineConfig;
pub use record::{FramingMode, ProcessOutcome, RecordPayload, SourceRecord, TransformOutput};
pub use reload::{ReloadController, ReloadSettings};
pub use store::MappingStore;

use crate::engine::error::{codes, ErrorInfo, RecordFailure, ReshapeError, Result};
use crate::engine::metrics::EngineMetrics;
use crate::engine::source::MappingSource;
use crate::engine::validation::CompiledMapping;
use log::{error, warn};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

/// The record orchestrator: looks up the mapping for each record, drives the
/// template interpreter, and frames the output for the sink adapter.
///
/// The per-record path is synchronous and CPU-bound; all I/O lives in the
/// [`ReloadController`].
pub struct Engine {
    config: EngineConfig,
    store: Arc<MappingStore>,
}

impl Engine {
    pub fn new(config: EngineConfig, store: Arc<MappingStore>) -> Self {
        Self { config, store }
    }

    /// Build an engine whose mapping rules come from a JSON string. Handy for
    /// hosts that manage configuration themselves, and for tests.
    pub fn from_rules_json(config: EngineConfig, rules_json: &str) -> Result<Self> {
        Ok(Self::new(config, Arc::new(MappingStore::from_json(rules_json)?)))
    }

    /// Load the initial mapping from the configured source and, when hot
    /// reload is enabled, start the background controller.
    ///
    /// The returned controller (if any) owns the source client; call
    /// [`ReloadController::shutdown`] on host teardown.
    pub async fn bootstrap(config: EngineConfig) -> Result<(Self, Option<ReloadController>)> {
        let source = MappingSource::from_config(&config)?;
        let document = source.fetch().await?;
        let store = Arc::new(MappingStore::from_json(&document.body)?);

        let controller = if config.hot_reload_enabled {
            let settings =
                ReloadSettings::with_interval(Duration::from_secs(config.hot_reload_interval_secs));
            let controller = ReloadController::new(source, Arc::clone(&store), settings);
            controller.seed(&document);
            controller.start();
            Some(controller)
        } else {
            None
        };

        Ok((Self::new(config, store), controller))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<MappingStore> {
        &self.store
    }

    /// Process one record.
    ///
    /// A mapping miss yields [`ProcessOutcome::Unmapped`] with a
    /// `MAPPING_MISS` event; the host passes the record through unchanged.
    /// An unparseable payload or a structurally unusable template output
    /// fails the record with a [`RecordFailure`] whose event the host can
    /// attach when routing to a dead-letter sink. Everything softer travels
    /// as events on the transformed output.
    pub fn process(
        &self,
        record: &SourceRecord,
    ) -> std::result::Result<ProcessOutcome, RecordFailure> {
        let started = Instant::now();
        let metrics = EngineMetrics::global();

        let input = match record.payload.parse() {
            Ok(input) => input,
            Err(error) => {
                error!("Invalid JSON payload for topic={}: {error}", record.topic);
                metrics.record_failure();
                return Err(RecordFailure::new(error, codes::PARSE_ERROR));
            }
        };

        let rules = self.store.snapshot();
        let Some(mapping) = rules.lookup(&self.config.connector_name, &record.topic) else {
            let lookup_key = if self.config.connector_name.is_empty() {
                format!("topic={}", record.topic)
            } else {
                format!("connector={}", self.config.connector_name)
            };
            if self.config.fail_on_missing_mapping {
                error!("Missing mapping for {lookup_key}");
            } else {
                warn!("No mapping for {lookup_key} (leaving record unchanged)");
            }
            metrics.record_mapping_miss();
            metrics.record_skipped();
            return Ok(ProcessOutcome::Unmapped(ErrorInfo::new(
                codes::MAPPING_MISS,
                format!("no mapping for {lookup_key}"),
            )));
        };

        let mut errors = Vec::new();
        let projected = mapping.output.project(&input, &record.topic, &mut errors);

        // The template grammar admits a field-spec or $array form at the top
        // level, which projects to a non-object the sink cannot take. The
        // validator lets such documents through; catch the escape here.
        let Value::Object(payload) = projected else {
            let error = ReshapeError::Template(format!(
                "output template for topic={} did not produce an object",
                record.topic
            ));
            error!("{error}");
            metrics.record_failure();
            return Err(RecordFailure::new(error, codes::TEMPLATE_ERROR));
        };

        let value = self.frame(payload, &input, record, mapping);

        metrics.record_success(started.elapsed());
        Ok(ProcessOutcome::Transformed(TransformOutput {
            value,
            errors,
        }))
    }

    /// Apply the configured framing. Wrapped framing nests the projection
    /// under the mapping's root key and may attach the `_source` and `_raw`
    /// side-channels; flat framing emits the projection directly and
    /// suppresses both.
    fn frame(
        &self,
        mut payload: Map<String, Value>,
        input: &Value,
        record: &SourceRecord,
        mapping: &CompiledMapping,
    ) -> Value {
        match self.config.framing {
            FramingMode::Flat => Value::Object(payload),
            FramingMode::Wrapped => {
                if self.config.attach_source_metadata {
                    let mut meta = Map::new();
                    meta.insert("topic".to_string(), Value::String(record.topic.clone()));
                    if let Some(partition) = record.partition {
                        meta.insert("partition".to_string(), json!(partition));
                    }
                    payload.insert("_source".to_string(), Value::Object(meta));
                }
                if self.config.store_raw_payload {
                    payload.insert("_raw".to_string(), input.clone());
                }
                let mut wrapped = Map::new();
                wrapped.insert(mapping.root.clone(), Value::Object(payload));
                Value::Object(wrapped)
            }
        }
    }
}

/// Clear every process-wide cache (compiled paths, converted date patterns,
/// encryption helpers). Intended for host teardown.
pub fn clear_caches() {
    path::clear_cache();
    transforms::date::clear_cache();
    transforms::crypto::clear_cache();
}

/// Sizes of the process-wide caches, keyed by cache name.
pub fn cache_stats() -> Vec<(&'static str, usize)> {
    vec![
        ("compiled_paths", path::cache_size()),
        ("date_patterns", transforms::date::cache_size()),
        ("encryption_helpers", transforms::crypto::cache_size()),
    ]
}
