//! Recall engine entrypoint: load cleaned records into the store, build the
//! offline training table, score a single query, or summarize a device.

use recall_engine::{
    config::{EngineConfig, StoreBackend},
    events::{read_ndjson, DeviceRecord, ManufacturerRecord, RecallEvent},
    features::build_training_table,
    logging::{PredictionAudit, StructuredLogger},
    model::{ModelSchema, OnnxClassifier},
    service::{PredictRequest, PredictService, Prediction},
    store::{HttpStore, SqliteStore},
    summary::StatusSummaryService,
};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::info;

type MainError = Box<dyn std::error::Error + Send + Sync>;

const USAGE: &str = "usage: recall-engine <command>\n\
  load <events.ndjson> <devices.ndjson> <manufacturers.ndjson>\n\
  build-table <events.ndjson> <devices.ndjson> <manufacturers.ndjson> <out.ndjson>\n\
  predict [request.json]        (reads the request from stdin when omitted)\n\
  summary <country> <device-name>";

fn main() -> Result<(), MainError> {
    let config_path = std::env::var("RECALL_CONFIG_PATH")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("config.json"));
    let config = EngineConfig::load(&config_path);

    StructuredLogger::init(config.log.json, &config.log.level);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("load") if args.len() == 4 => cmd_load(&config, &args[1], &args[2], &args[3]),
        Some("build-table") if args.len() == 5 => {
            cmd_build_table(&args[1], &args[2], &args[3], &args[4])
        }
        Some("predict") if args.len() <= 2 => cmd_predict(&config, args.get(1).map(String::as_str)),
        Some("summary") if args.len() == 3 => cmd_summary(&config, &args[1], &args[2]),
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

fn cmd_load(
    config: &EngineConfig,
    events_path: &str,
    devices_path: &str,
    manufacturers_path: &str,
) -> Result<(), MainError> {
    let mut events: Vec<RecallEvent> = read_ndjson(Path::new(events_path))?;
    let devices: Vec<DeviceRecord> = read_ndjson(Path::new(devices_path))?;
    let manufacturers: Vec<ManufacturerRecord> = read_ndjson(Path::new(manufacturers_path))?;

    // Events carry only the device key in the cleaned export; fill the
    // manufacturer key from the device record so manufacturer-level online
    // queries see the same linkage the batch join produces.
    let device_manufacturer: HashMap<&str, &str> = devices
        .iter()
        .filter_map(|d| {
            d.manufacturer_id
                .as_deref()
                .map(|m| (d.id.as_str(), m))
        })
        .collect();
    for event in &mut events {
        if event.manufacturer_id.is_none() {
            event.manufacturer_id = event
                .device_id
                .as_deref()
                .and_then(|id| device_manufacturer.get(id))
                .map(|m| m.to_string());
        }
    }

    std::fs::create_dir_all(&config.data_dir)?;
    let store = SqliteStore::open(&config.store_path())?;
    for device in &devices {
        store.insert_device(device)?;
    }
    for manufacturer in &manufacturers {
        store.insert_manufacturer(manufacturer)?;
    }
    for event in &events {
        store.insert_event(event)?;
    }
    info!(
        events = events.len(),
        devices = devices.len(),
        manufacturers = manufacturers.len(),
        "store loaded"
    );
    Ok(())
}

fn cmd_build_table(
    events_path: &str,
    devices_path: &str,
    manufacturers_path: &str,
    out_path: &str,
) -> Result<(), MainError> {
    let events: Vec<RecallEvent> = read_ndjson(Path::new(events_path))?;
    let devices: Vec<DeviceRecord> = read_ndjson(Path::new(devices_path))?;
    let manufacturers: Vec<ManufacturerRecord> = read_ndjson(Path::new(manufacturers_path))?;

    let rows = build_training_table(&events, &devices, &manufacturers);
    let mut out = std::io::BufWriter::new(std::fs::File::create(out_path)?);
    for row in &rows {
        writeln!(out, "{}", serde_json::to_string(row)?)?;
    }
    out.flush()?;
    info!(input = events.len(), rows = rows.len(), out = out_path, "training table written");
    Ok(())
}

fn cmd_predict(config: &EngineConfig, request_path: Option<&str>) -> Result<(), MainError> {
    let request: PredictRequest = match request_path {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => serde_json::from_reader(std::io::stdin().lock())?,
    };

    let schema = ModelSchema::load(&config.model.schema_path)?;
    let classifier = OnnxClassifier::load(&config.model.model_path, schema)?;

    let prediction = match config.store.backend {
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(&config.store_path())?;
            let service = PredictService::new(store, classifier);
            let prediction = service.predict(&request)?;
            let payload = serde_json::to_string(&prediction)?;
            service.store().record_prediction(
                &prediction.id,
                &prediction.ts,
                prediction.device_id.as_deref(),
                prediction.manufacturer_id.as_deref(),
                &prediction.label,
                &payload,
            )?;
            prediction
        }
        StoreBackend::Http => {
            let base_url = config
                .store
                .base_url
                .as_deref()
                .ok_or("store.base_url is required for the http backend")?;
            let store = HttpStore::new(
                base_url,
                Duration::from_secs(config.store.timeout_secs),
                Duration::from_secs(config.store.connect_timeout_secs),
            )?;
            PredictService::new(store, classifier).predict(&request)?
        }
    };

    audit(&prediction);
    println!("{}", serde_json::to_string(&prediction)?);
    Ok(())
}

fn cmd_summary(config: &EngineConfig, country: &str, device_name: &str) -> Result<(), MainError> {
    let store = SqliteStore::open(&config.store_path())?;
    let service = StatusSummaryService::new(&store);
    match service.get_or_build(country, device_name)? {
        Some(summary) => println!("{}", serde_json::to_string(&summary)?),
        None => {
            eprintln!("device not found: {device_name} ({country})");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn audit(prediction: &Prediction) {
    let confidence = prediction
        .probabilities
        .as_ref()
        .and_then(|p| p.get(&prediction.label))
        .copied();
    let line = PredictionAudit {
        ts: prediction.ts.clone(),
        prediction_id: &prediction.id,
        device_id: prediction.device_id.as_deref(),
        manufacturer_id: prediction.manufacturer_id.as_deref(),
        as_of: prediction.as_of.to_string(),
        label: &prediction.label,
        confidence,
    };
    StructuredLogger::emit_json(&line, &mut std::io::stderr());
}
