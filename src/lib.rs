/*!
# Reshape-rs

A mapping-driven JSON reshaping engine for streaming connector pipelines.

## Overview

Reshape-rs sits between a source (which delivers raw JSON records) and a sink
(which consumes structured values). For every inbound record it parses the
payload, looks up a declarative mapping by connector name (falling back to the
topic), projects the input tree through an output template, and hands the
reshaped tree to the sink adapter. Mappings can be hot-reloaded from a remote
object store without touching in-flight records.

## Key Components

* **Engine**: the per-record orchestrator — parse, lookup, project, frame
* **Path engine**: a JSONPath-like subset with array broadcasting, wildcards
  and predicate filters
* **Output templates**: recursive declarative descriptions of the output
  shape, with per-field transform pipelines (`toString`, `dateFormat`,
  `encrypt`, `mask`)
* **MappingStore**: the validated, atomically swapped *current* mapping rules
* **ReloadController**: a background task that detects remote changes via
  entity tags with a content-hash fallback and adopts new documents with
  last-known-good semantics

## Usage Example

```rust
use reshape_rs::{Engine, EngineConfig, RecordPayload, SourceRecord};

let rules = r#"{
    "connectors": {
        "assessment-sink": {
            "root": "assessment",
            "output": {
                "assessmentId": {"paths": ["$.assessmentId"], "required": true},
                "ssn": {
                    "paths": ["$.identifier[?(@.system=='ssn')].value"],
                    "transforms": [{"type": "mask", "pattern": "ssn"}]
                }
            }
        }
    }
}"#;

let config = EngineConfig {
    connector_name: "assessment-sink".to_string(),
    attach_source_metadata: false,
    ..Default::default()
};
let engine = Engine::from_rules_json(config, rules).unwrap();

let record = SourceRecord::new(
    "assessments",
    RecordPayload::Text(
        r#"{"assessmentId":"12345","identifier":[{"system":"ssn","value":"123-45-6789"}]}"#
            .to_string(),
    ),
);

let output = engine
    .process(&record)
    .unwrap()
    .into_transformed()
    .expect("mapping matched");
assert_eq!(output.value["assessment"]["assessmentId"], "12345");
assert_eq!(output.value["assessment"]["ssn"], "***-**-6789");
```

## Hot Reload

With `hotReloadEnabled`, [`Engine::bootstrap`] loads the initial mapping from
the configured source and starts a [`ReloadController`] that polls for
changes in the background:

```rust,no_run
use reshape_rs::{Engine, EngineConfig};

# async fn run() -> reshape_rs::Result<()> {
let mut config = EngineConfig::from_json(r#"{
    "connectorName": "assessment-sink",
    "source": "s3",
    "mappingLocation": "mappings/topic-mappings.json",
    "s3": {"endpoint": "http://minio:9000", "bucket": "configs"},
    "hotReloadEnabled": true
}"#)?;
config.apply_env_overrides();

let (engine, reload) = Engine::bootstrap(config).await?;
// ... hand `engine` to the record workers ...
if let Some(reload) = reload {
    reload.shutdown().await;
}
# Ok(())
# }
```

## Error Handling

Per-record soft failures (a required field that matched nothing, an
unparseable date, an unresolved encryption key) never fail the record; they
degrade per field and are reported as structured [`ErrorInfo`] events on the
output. An unparseable payload, or a template that projects to something the
sink cannot take, fails the record with a [`RecordFailure`] carrying both the
error and the event to attach when routing to a dead-letter sink. A mapping
miss yields [`engine::ProcessOutcome::Unmapped`] with its own event and the
record passes through unchanged. Background reload failures never touch the
per-record path; the latest one is readable from
[`ReloadController::last_failure`].
*/

pub mod engine;

// Re-export all public APIs for easier access
pub use engine::error::{codes, ErrorInfo, RecordFailure, ReshapeError, Result};
pub use engine::metrics::{EngineMetrics, MetricsSnapshot};
pub use engine::reload::{ReloadController, ReloadSettings};
pub use engine::source::MappingSource;
pub use engine::store::MappingStore;
pub use engine::{cache_stats, clear_caches, Engine};
pub use engine::{
    EngineConfig, FramingMode, ProcessOutcome, RecordPayload, SourceRecord, TransformOutput,
};
