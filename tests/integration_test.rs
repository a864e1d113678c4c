//! Integration: config load, store adapters in agreement, training table,
//! prediction flow, classifier boundary errors, status summary.

use chrono::NaiveDate;
use recall_engine::config::{EngineConfig, StoreBackend};
use recall_engine::events::{DeviceRecord, ManufacturerRecord, RecallEvent};
use recall_engine::features::{build_training_table, FeatureVector, FEATURE_NAMES};
use recall_engine::history::{Cutoff, HistoryService};
use recall_engine::model::{ClassPrediction, Classifier, ClassifierError, ModelSchema, OnnxClassifier};
use recall_engine::service::{PredictRequest, PredictService};
use recall_engine::store::{EntityKind, EventStore, MemoryStore, SqliteStore};
use recall_engine::summary::{normalize_status, StatusSummaryService};
use std::path::Path;

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn event(id: &str, device: &str, manufacturer: Option<&str>, label: &str, date: &str) -> RecallEvent {
    RecallEvent {
        id: id.to_string(),
        device_id: Some(device.to_string()),
        manufacturer_id: manufacturer.map(String::from),
        action: Some("Recall".to_string()),
        action_classification: Some(label.to_string()),
        reason: None,
        determined_cause: None,
        status: None,
        country: Some("USA".to_string()),
        date: Some(date.to_string()),
        date_posted: None,
        date_updated: None,
    }
}

fn device(id: &str, manufacturer: &str) -> DeviceRecord {
    DeviceRecord {
        id: id.to_string(),
        name: Some(format!("Device {id}")),
        classification: Some("Cardiac Device".to_string()),
        risk_class: Some("III".to_string()),
        implanted: Some("Yes".to_string()),
        quantity_in_commerce: Some(50_000.0),
        manufacturer_id: Some(manufacturer.to_string()),
        country: Some("USA".to_string()),
    }
}

fn manufacturer(id: &str) -> ManufacturerRecord {
    ManufacturerRecord {
        id: id.to_string(),
        name: Some(format!("manufacturer {id}")),
        parent_company: Some("Parent Corp".to_string()),
    }
}

fn dataset() -> (Vec<RecallEvent>, Vec<DeviceRecord>, Vec<ManufacturerRecord>) {
    (
        vec![
            event("e1", "D1", Some("M1"), "CLASS I", "2019-05-01"),
            event("e2", "D2", Some("M1"), "CLASS III", "2019-06-10"),
            event("e3", "D1", Some("M1"), "CLASS II", "2019-08-20"),
            event("e4", "D1", Some("M1"), "CLASS I", "2020-01-15"),
            event("e5", "D2", Some("M1"), "CLASS II", "2020-02-02"),
        ],
        vec![device("D1", "M1"), device("D2", "M1")],
        vec![manufacturer("M1")],
    )
}

struct FixedClassifier;

impl Classifier for FixedClassifier {
    fn predict(&self, _features: &FeatureVector) -> Result<ClassPrediction, ClassifierError> {
        Ok(ClassPrediction {
            label: "CLASS II".to_string(),
            probabilities: None,
        })
    }
}

fn test_schema() -> ModelSchema {
    let schema = serde_json::json!({
        "feature_names": FEATURE_NAMES,
        "classes": ["CLASS I", "CLASS II", "CLASS III"],
        "categories": {
            "risk_class": ["I", "II", "III", "Unknown"],
            "classification": ["Cardiac Device", "Unknown"],
            "country": ["USA", "Unknown"],
            "parent_company": ["Parent Corp", "Independent"]
        }
    });
    let schema: ModelSchema = serde_json::from_value(schema).unwrap();
    schema.validate().unwrap();
    schema
}

#[test]
fn config_load_default() {
    let c = EngineConfig::load(Path::new("nonexistent.json"));
    assert_eq!(c.store.backend, StoreBackend::Sqlite);
    assert_eq!(c.store.timeout_secs, 15);
    assert!(c.log.json);
    assert!(c.store_path().ends_with("events.db"));
}

#[test]
fn sqlite_and_memory_stores_agree() {
    let (events, devices, manufacturers) = dataset();

    let dir = tempfile::tempdir().unwrap();
    let sqlite = SqliteStore::open(&dir.path().join("events.db")).unwrap();
    for d in &devices {
        sqlite.insert_device(d).unwrap();
    }
    for m in &manufacturers {
        sqlite.insert_manufacturer(m).unwrap();
    }
    for e in &events {
        sqlite.insert_event(e).unwrap();
    }
    let memory = MemoryStore::new(events, devices, manufacturers);

    let cutoffs = [
        Cutoff::Before(day("2019-08-20")),
        Cutoff::AtOrBefore(day("2019-08-20")),
        Cutoff::AtOrBefore(day("2020-12-31")),
    ];
    for cutoff in cutoffs {
        for id in ["D1", "D2", "D9"] {
            let a = sqlite.entity_history(EntityKind::Device, id, cutoff).unwrap();
            let b = memory.entity_history(EntityKind::Device, id, cutoff).unwrap();
            assert_eq!(a, b, "device {id} diverged");
        }
        let a = sqlite
            .entity_history(EntityKind::Manufacturer, "M1", cutoff)
            .unwrap();
        let b = memory
            .entity_history(EntityKind::Manufacturer, "M1", cutoff)
            .unwrap();
        assert_eq!(a, b, "manufacturer diverged");
    }
}

#[test]
fn sqlite_roundtrip_and_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("events.db")).unwrap();
    let (events, devices, manufacturers) = dataset();
    for d in &devices {
        store.insert_device(d).unwrap();
    }
    for m in &manufacturers {
        store.insert_manufacturer(m).unwrap();
    }
    for e in &events {
        store.insert_event(e).unwrap();
    }

    let d1 = store.device("D1").unwrap().unwrap();
    assert_eq!(d1.risk_class.as_deref(), Some("III"));
    assert_eq!(
        store.manufacturer_for_device("D1").unwrap().as_deref(),
        Some("M1")
    );
    assert!(store.device("missing").unwrap().is_none());

    let history = HistoryService::new(&store);
    let snap = history
        .device_history("D1", Cutoff::AtOrBefore(day("2020-01-15")))
        .unwrap();
    assert_eq!(snap.class_i, 2);
    assert_eq!(snap.class_ii, 1);
    assert_eq!(snap.total, 3);
    assert_eq!(snap.days_since_prior, 0);

    store
        .record_prediction("p1", "2020-06-01T00:00:00Z", Some("D1"), Some("M1"), "CLASS I", "{}")
        .unwrap();
    let (label, payload) = store.prediction("p1").unwrap().unwrap();
    assert_eq!(label, "CLASS I");
    assert_eq!(payload, "{}");
}

#[test]
fn training_table_is_leak_safe_and_joins_attributes() {
    let (events, devices, manufacturers) = dataset();
    let rows = build_training_table(&events, &devices, &manufacturers);
    assert_eq!(rows.len(), 5);

    // e1 is D1's first event: zero device history, no leakage of its own
    // CLASS I label.
    let r1 = rows.iter().find(|r| r.event_id == "e1").unwrap();
    assert_eq!(r1.features.device_prior_total, 0);
    assert_eq!(r1.features.device_days_since_prior, -1);
    assert_eq!(r1.features.manufacturer_prior_total, 0);
    assert_eq!(r1.label, "CLASS I");
    assert_eq!(r1.features.risk_class, "III");
    assert!(r1.features.implanted);
    assert_eq!(r1.features.parent_company, "Parent Corp");

    // e4 sees D1's two earlier events, and all of M1's earlier events.
    let r4 = rows.iter().find(|r| r.event_id == "e4").unwrap();
    assert_eq!(r4.features.device_prior_class_i, 1);
    assert_eq!(r4.features.device_prior_class_ii, 1);
    assert_eq!(r4.features.device_prior_total, 2);
    assert_eq!(r4.features.manufacturer_prior_total, 3);
}

#[test]
fn training_table_substitutes_defaults_for_missing_records() {
    let events = vec![event("e1", "D-unjoined", None, "CLASS II", "2020-01-01")];
    let rows = build_training_table(&events, &[], &[]);
    assert_eq!(rows.len(), 1);
    let f = &rows[0].features;
    assert_eq!(f.risk_class, "Unknown");
    assert_eq!(f.classification, "Unknown");
    assert!(!f.implanted);
    assert_eq!(f.quantity_in_commerce, 0.0);
    assert_eq!(f.country, "Unknown");
    assert_eq!(f.parent_company, "Independent");
}

#[test]
fn training_table_drops_unlabeled_and_timeless_events() {
    let (mut events, devices, manufacturers) = dataset();
    events.push(event("e6", "D1", Some("M1"), "RECALL", "2020-03-01"));
    let mut timeless = event("e7", "D1", Some("M1"), "CLASS I", "2020-04-01");
    timeless.date = None;
    events.push(timeless);
    let rows = build_training_table(&events, &devices, &manufacturers);
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.event_id != "e6" && r.event_id != "e7"));
}

#[test]
fn predict_service_resolves_manufacturer_and_histories() {
    let (events, devices, manufacturers) = dataset();
    let store = MemoryStore::new(events, devices, manufacturers);
    let service = PredictService::new(store, FixedClassifier);

    let request = PredictRequest {
        device_id: Some("D1".to_string()),
        as_of: Some(day("2020-06-01")),
        ..PredictRequest::default()
    };
    let prediction = service.predict(&request).unwrap();
    assert_eq!(prediction.label, "CLASS II");
    assert_eq!(prediction.manufacturer_id.as_deref(), Some("M1"));
    assert_eq!(prediction.device_history.total, 3);
    assert_eq!(prediction.manufacturer_history.total, 5);
    assert_eq!(prediction.features.risk_class, "III");
}

#[test]
fn predict_service_zero_history_for_unknown_device() {
    let store = MemoryStore::new(vec![], vec![], vec![]);
    let service = PredictService::new(store, FixedClassifier);
    let request = PredictRequest {
        device_id: Some("brand-new".to_string()),
        risk_class: Some("II".to_string()),
        as_of: Some(day("2020-06-01")),
        ..PredictRequest::default()
    };
    let prediction = service.predict(&request).unwrap();
    assert_eq!(prediction.device_history.total, 0);
    assert_eq!(prediction.device_history.days_since_prior, -1);
    assert_eq!(prediction.features.risk_class, "II");
    assert_eq!(prediction.features.parent_company, "Independent");
}

#[test]
fn schema_rejects_wrong_feature_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.json");
    std::fs::write(
        &path,
        r#"{"feature_names": ["only_one"], "classes": ["CLASS I"]}"#,
    )
    .unwrap();
    match ModelSchema::load(&path) {
        Err(ClassifierError::SchemaMismatch(_)) => {}
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
}

#[test]
fn schema_encodes_one_hot_and_log_scaled_numerics() {
    let schema = test_schema();
    let (events, devices, manufacturers) = dataset();
    let rows = build_training_table(&events, &devices, &manufacturers);
    let features = &rows.iter().find(|r| r.event_id == "e4").unwrap().features;

    let encoded = schema.encode(features).unwrap();
    assert_eq!(encoded.len(), schema.input_dim());
    // risk_class "III" one-hot: [I, II, III, Unknown]
    assert_eq!(&encoded[0..4], &[0.0, 0.0, 1.0, 0.0]);
    // implanted flag is log-scaled with everything numeric: ln(1 + 1)
    let implanted_idx = 4 + 2; // after classification vocab
    assert!((encoded[implanted_idx] - 2.0_f32.ln()).abs() < 1e-6);
}

#[test]
fn schema_encodes_unknown_category_as_all_zeros() {
    let schema = test_schema();
    let events = vec![event("e1", "D-unjoined", None, "CLASS II", "2020-01-01")];
    let rows = build_training_table(&events, &[], &[]);
    let encoded = schema.encode(&rows[0].features).unwrap();
    // country block starts after risk_class(4) + classification(2) +
    // implanted(1) + quantity(1); defaulted "Unknown" hits vocab slot 1.
    assert_eq!(&encoded[8..10], &[0.0, 1.0]);

    let mut features = rows[0].features.clone();
    features.country = "Atlantis".to_string();
    let encoded_unseen = schema.encode(&features).unwrap();
    assert_eq!(encoded_unseen.len(), encoded.len());
    assert_eq!(&encoded_unseen[8..10], &[0.0, 0.0]);
}

#[test]
fn onnx_classifier_without_model_fails_closed() {
    let classifier = OnnxClassifier::load(Path::new("nonexistent.onnx"), test_schema()).unwrap();
    let (events, devices, manufacturers) = dataset();
    let rows = build_training_table(&events, &devices, &manufacturers);
    match classifier.predict(&rows[0].features) {
        Err(ClassifierError::ModelUnavailable(_)) => {}
        other => panic!("expected ModelUnavailable, got {other:?}"),
    }
}

#[test]
fn status_summary_counts_and_caches() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("events.db")).unwrap();
    store.insert_device(&device("D1", "M1")).unwrap();
    store.insert_manufacturer(&manufacturer("M1")).unwrap();

    let mut e1 = event("e1", "D1", Some("M1"), "CLASS I", "2020-01-01");
    e1.status = Some("Ongoing".to_string());
    let mut e2 = event("e2", "D1", Some("M1"), "CLASS II", "2020-02-01");
    e2.status = Some("2020-06-01".to_string());
    let mut e3 = event("e3", "D1", Some("M1"), "CLASS II", "2020-03-01");
    e3.status = None;
    for e in [&e1, &e2, &e3] {
        store.insert_event(e).unwrap();
    }

    let service = StatusSummaryService::new(&store);
    let summary = service.get_or_build("USA", "Device D1").unwrap().unwrap();
    assert_eq!(summary.status_counts.get("Ongoing"), Some(&1));
    assert_eq!(summary.status_counts.get("Terminated"), Some(&1));
    assert_eq!(summary.status_counts.get("Unknown"), Some(&1));
    assert_eq!(summary.manufacturers, vec!["manufacturer M1".to_string()]);
    assert!(summary.top_events.len() <= 5);

    // Cached: a later event does not change the stored summary.
    let mut e4 = event("e4", "D1", Some("M1"), "CLASS I", "2020-04-01");
    e4.status = Some("Ongoing".to_string());
    store.insert_event(&e4).unwrap();
    let again = service.get_or_build("USA", "Device D1").unwrap().unwrap();
    assert_eq!(again.status_counts.get("Ongoing"), Some(&1));

    assert!(service.get_or_build("USA", "No Such Device").unwrap().is_none());
}

#[test]
fn status_normalization_rules() {
    assert_eq!(normalize_status(None), "Unknown");
    assert_eq!(normalize_status(Some("  ")), "Unknown");
    assert_eq!(normalize_status(Some("terminated")), "Terminated");
    assert_eq!(normalize_status(Some("2021-09-30")), "Terminated");
    assert_eq!(normalize_status(Some("Ongoing")), "Ongoing");
}
