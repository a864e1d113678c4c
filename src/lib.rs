//! Recall Engine — leak-safe device/manufacturer history features for
//! recall severity prediction.
//!
//! Modular structure:
//! - [`events`] — Canonical event, device, and manufacturer records
//! - [`history`] — Temporal key resolution and batch/online aggregation
//! - [`store`] — Event store adapters (memory, SQLite, HTTP)
//! - [`features`] — Feature schema and assembly
//! - [`model`] — ONNX severity classifier boundary
//! - [`service`] — Online prediction flow
//! - [`summary`] — Cached device status summaries
//! - [`logging`] — Structured JSON logging

pub mod config;
pub mod events;
pub mod features;
pub mod history;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;
pub mod summary;

pub use config::EngineConfig;
pub use events::{DeviceRecord, ManufacturerRecord, RecallEvent, SeverityClass};
pub use features::{FeatureVector, FEATURE_NAMES};
pub use history::{Cutoff, HistoryService, HistorySnapshot};
pub use model::{Classifier, ModelSchema, OnnxClassifier};
pub use service::{EngineError, PredictRequest, PredictService, Prediction};
pub use store::{EventStore, HttpStore, MemoryStore, SqliteStore, StoreError};
pub use summary::{StatusSummary, StatusSummaryService};
