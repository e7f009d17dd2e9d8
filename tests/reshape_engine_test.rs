use reshape_rs::{Engine, EngineConfig, FramingMode, ProcessOutcome, RecordPayload, SourceRecord};
use serde_json::{json, Value};

const MAPPING: &str = r#"{
    "version": 1,
    "connectors": {
        "mongo-assessment-sink": {
            "root": "assessment",
            "output": {
                "assessmentId": {"paths": ["$.assessmentId"], "required": true},
                "memberName": {
                    "paths": ["$.member.name"],
                    "transforms": [{"type": "mask", "pattern": "name"}]
                },
                "ssn": {
                    "paths": ["$.identifier[?(@.system=='ssn')].value"],
                    "transforms": [{"type": "mask", "pattern": "ssn"}]
                },
                "scores": {"paths": ["$.sections.score"], "multi": "array"},
                "eventTime": {
                    "paths": ["$.ts"],
                    "transforms": [{
                        "type": "dateFormat",
                        "inputFormats": ["yyyy-MM-dd'T'HH:mm:ss"],
                        "outputFormat": "yyyy-MM-dd'T'HH:mm:ssXXX",
                        "timezone": "UTC"
                    }]
                },
                "diagnoses": {"$array": {
                    "path": "$.diagnosis",
                    "item": {
                        "code": {"paths": ["$.code"]},
                        "display": {"paths": ["$.display"], "transforms": [{"type": "toString"}]}
                    }
                }}
            }
        }
    }
}"#;

fn input() -> Value {
    json!({
        "assessmentId": "12345",
        "ts": "2026-02-10T12:34:56",
        "member": {"name": "John Smith"},
        "identifier": [
            {"system": "mrn", "value": "MRN-1"},
            {"system": "ssn", "value": "123-45-6789"}
        ],
        "sections": [{"score": 4}, {"score": 7}, {"other": true}],
        "diagnosis": [
            {"code": "F32.9", "display": 101},
            {"code": "E11.9", "display": "diabetes"}
        ]
    })
}

fn engine(mutator: impl FnOnce(&mut EngineConfig)) -> Engine {
    let mut config = EngineConfig {
        connector_name: "mongo-assessment-sink".to_string(),
        attach_source_metadata: false,
        ..Default::default()
    };
    mutator(&mut config);
    Engine::from_rules_json(config, MAPPING).unwrap()
}

#[test]
fn transforms_full_document_by_connector_name() {
    let engine = engine(|_| {});
    let record = SourceRecord::new("any-topic", RecordPayload::Json(input()));

    let output = engine
        .process(&record)
        .unwrap()
        .into_transformed()
        .expect("mapping matched");
    let assessment = &output.value["assessment"];

    assert_eq!(assessment["assessmentId"], "12345");
    assert_eq!(assessment["memberName"], "J*** S***");
    assert_eq!(assessment["ssn"], "***-**-6789");
    assert_eq!(assessment["scores"], json!([4, 7]));
    assert_eq!(assessment["eventTime"], "2026-02-10T12:34:56Z");
    assert_eq!(
        assessment["diagnoses"],
        json!([
            {"code": "F32.9", "display": "101"},
            {"code": "E11.9", "display": "diabetes"}
        ])
    );
    assert!(!output.has_errors());
}

#[test]
fn byte_and_text_payloads_behave_identically() {
    let engine = engine(|_| {});
    let text = serde_json::to_string(&input()).unwrap();

    let from_bytes = engine
        .process(&SourceRecord::new(
            "t",
            RecordPayload::Bytes(text.clone().into_bytes()),
        ))
        .unwrap()
        .into_transformed()
        .unwrap();
    let from_text = engine
        .process(&SourceRecord::new("t", RecordPayload::Text(text)))
        .unwrap()
        .into_transformed()
        .unwrap();

    assert_eq!(from_bytes.value, from_text.value);
}

#[test]
fn wrapped_framing_attaches_metadata_and_raw() {
    let engine = engine(|config| {
        config.attach_source_metadata = true;
        config.store_raw_payload = true;
    });
    let record = SourceRecord::new("assessments", RecordPayload::Json(input())).with_partition(7);

    let output = engine.process(&record).unwrap().into_transformed().unwrap();
    let assessment = &output.value["assessment"];
    assert_eq!(
        assessment["_source"],
        json!({"topic": "assessments", "partition": 7})
    );
    assert_eq!(assessment["_raw"], input());
}

#[test]
fn flat_framing_emits_projection_directly() {
    let engine = engine(|config| {
        config.framing = FramingMode::Flat;
        config.store_raw_payload = true;
    });
    let record = SourceRecord::new("assessments", RecordPayload::Json(input()));

    let output = engine.process(&record).unwrap().into_transformed().unwrap();
    assert_eq!(output.value["assessmentId"], "12345");
    assert!(output.value.get("assessment").is_none());
    assert!(output.value.get("_raw").is_none());
    assert!(output.value.get("_source").is_none());
}

#[test]
fn missing_mapping_passes_record_through() {
    let engine = engine(|config| {
        config.connector_name = "unknown-sink".to_string();
    });
    let record = SourceRecord::new("unmapped", RecordPayload::Json(json!({"a": 1})));
    let outcome = engine.process(&record).unwrap();
    assert!(outcome.is_unmapped());
    match outcome {
        ProcessOutcome::Unmapped(event) => assert_eq!(event.code, "MAPPING_MISS"),
        other => panic!("expected unmapped outcome, got {other:?}"),
    }
}

#[test]
fn required_field_violation_emits_null_and_event() {
    let engine = engine(|_| {});
    let record = SourceRecord::new("t", RecordPayload::Json(json!({"member": {}})));

    let output = engine.process(&record).unwrap().into_transformed().unwrap();
    assert_eq!(output.value["assessment"]["assessmentId"], Value::Null);
    assert!(output.has_errors());
    assert!(output
        .errors
        .iter()
        .any(|e| e.code == "REQUIRED_FIELD_MISSING"));
}

#[test]
fn adopting_new_rules_changes_subsequent_records() {
    let engine = engine(|_| {});
    let record = SourceRecord::new("t", RecordPayload::Json(input()));

    let before = engine.process(&record).unwrap().into_transformed().unwrap();
    assert_eq!(before.value["assessment"]["assessmentId"], "12345");

    engine
        .store()
        .try_adopt(
            r#"{"connectors": {"mongo-assessment-sink": {
                "root": "summary",
                "output": {"id": {"paths": ["$.assessmentId"]}}
            }}}"#,
        )
        .unwrap();

    let after = engine.process(&record).unwrap().into_transformed().unwrap();
    assert_eq!(after.value, json!({"summary": {"id": "12345"}}));
}

#[test]
fn rejected_rules_leave_processing_unchanged() {
    let engine = engine(|_| {});
    let record = SourceRecord::new("t", RecordPayload::Json(input()));

    assert!(engine
        .store()
        .try_adopt(r#"{"connectors": {"x": {"root": "r", "output": 5}}}"#)
        .is_err());

    let output = engine.process(&record).unwrap().into_transformed().unwrap();
    assert_eq!(output.value["assessment"]["assessmentId"], "12345");
}

mod hot_reload {
    use super::*;
    use object_store::memory::InMemory;
    use object_store::path::Path as ObjectPath;
    use object_store::{ObjectStore, PutPayload};
    use reshape_rs::{MappingSource, MappingStore, ReloadController, ReloadSettings};
    use std::sync::Arc;
    use std::time::Duration;

    const REMOTE_V1: &str = r#"{"connectors": {"sink": {
        "root": "claim",
        "output": {"id": {"paths": ["$.claimId"]}}
    }}}"#;
    const REMOTE_V2: &str = r#"{"connectors": {"sink": {
        "root": "claim",
        "output": {"id": {"paths": ["$.claimId"]}, "status": {"paths": ["$.status"]}}
    }}}"#;

    async fn put(store: &InMemory, body: &str) {
        store
            .put(
                &ObjectPath::from("mappings.json"),
                PutPayload::from(body.as_bytes().to_vec()),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn remote_change_reaches_the_per_record_path() {
        let remote = Arc::new(InMemory::new());
        put(&remote, REMOTE_V1).await;

        let source = MappingSource::remote(remote.clone(), "mappings.json");
        let initial = source.fetch().await.unwrap();
        let store = Arc::new(MappingStore::from_json(&initial.body).unwrap());
        let controller = ReloadController::new(
            source,
            Arc::clone(&store),
            ReloadSettings::with_interval(Duration::from_millis(10)),
        );
        controller.seed(&initial);

        let config = EngineConfig {
            connector_name: "sink".to_string(),
            attach_source_metadata: false,
            ..Default::default()
        };
        let engine = Engine::new(config, store);
        let record = SourceRecord::new(
            "claims",
            RecordPayload::Json(json!({"claimId": "C-1", "status": "open"})),
        );

        let before = engine.process(&record).unwrap().into_transformed().unwrap();
        assert!(before.value["claim"].get("status").is_none());

        put(&remote, REMOTE_V2).await;
        controller.poll_once().await;

        let after = engine.process(&record).unwrap().into_transformed().unwrap();
        assert_eq!(after.value["claim"]["status"], "open");

        controller.shutdown().await;
    }
}
