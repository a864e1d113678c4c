//! Online prediction flow: resolve the manufacturer, fetch both histories
//! as of the cutoff, assemble features, classify.

use crate::events::{DeviceRecord, ManufacturerRecord};
use crate::features::{FeatureAssembler, FeatureVector, StaticAttributes};
use crate::history::{Cutoff, HistoryService, HistorySnapshot};
use crate::model::{Classifier, ClassifierError};
use crate::store::{EventStore, StoreError};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// One severity query. `as_of` defaults to today; request-supplied static
/// attributes win over store records, and fixed defaults fill the rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub manufacturer_id: Option<String>,
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
    #[serde(default)]
    pub risk_class: Option<String>,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub implanted: Option<bool>,
    #[serde(default)]
    pub quantity_in_commerce: Option<f64>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub parent_company: Option<String>,
}

/// Prediction response; both histories are echoed for transparency.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<BTreeMap<String, f32>>,
    pub as_of: NaiveDate,
    pub device_history: HistorySnapshot,
    pub manufacturer_history: HistorySnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer_id: Option<String>,
    pub ts: String,
    #[serde(skip)]
    pub features: FeatureVector,
}

pub struct PredictService<S: EventStore, C: Classifier> {
    store: S,
    classifier: C,
}

impl<S: EventStore, C: Classifier> PredictService<S, C> {
    pub fn new(store: S, classifier: C) -> Self {
        Self { store, classifier }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Score one request. The query's own hypothetical event is never in
    /// the store, so the inclusive cutoff is the correct "prior" semantics
    /// here; store failures propagate instead of degrading to zero history.
    pub fn predict(&self, request: &PredictRequest) -> Result<Prediction, EngineError> {
        let as_of = request
            .as_of
            .unwrap_or_else(|| Utc::now().date_naive());
        let cutoff = Cutoff::AtOrBefore(as_of);

        let manufacturer_id = match &request.manufacturer_id {
            Some(id) => Some(id.clone()),
            None => match &request.device_id {
                Some(device_id) => self.store.manufacturer_for_device(device_id)?,
                None => None,
            },
        };

        let history = HistoryService::new(&self.store);
        let device_history = match request.device_id.as_deref() {
            Some(id) => history.device_history(id, cutoff)?,
            None => HistorySnapshot::empty(),
        };
        let manufacturer_history = match manufacturer_id.as_deref() {
            Some(id) => history.manufacturer_history(id, cutoff)?,
            None => HistorySnapshot::empty(),
        };

        let device_record = match request.device_id.as_deref() {
            Some(id) => self.store.device(id)?,
            None => None,
        };
        let manufacturer_record = match manufacturer_id.as_deref() {
            Some(id) => self.store.manufacturer(id)?,
            None => None,
        };
        let attrs = merge_attributes(request, device_record.as_ref(), manufacturer_record.as_ref());

        let features =
            FeatureAssembler::assemble(&attrs, &device_history, &manufacturer_history);
        let outcome = self.classifier.predict(&features)?;

        Ok(Prediction {
            id: Uuid::new_v4().to_string(),
            label: outcome.label,
            probabilities: outcome.probabilities,
            as_of,
            device_history,
            manufacturer_history,
            device_id: request.device_id.clone(),
            manufacturer_id,
            ts: Utc::now().to_rfc3339(),
            features,
        })
    }
}

fn merge_attributes(
    request: &PredictRequest,
    device: Option<&DeviceRecord>,
    manufacturer: Option<&ManufacturerRecord>,
) -> StaticAttributes {
    let base = StaticAttributes::from_records(device, manufacturer);
    StaticAttributes {
        risk_class: request.risk_class.clone().unwrap_or(base.risk_class),
        classification: request
            .classification
            .clone()
            .unwrap_or(base.classification),
        implanted: request.implanted.unwrap_or(base.implanted),
        quantity_in_commerce: request
            .quantity_in_commerce
            .unwrap_or(base.quantity_in_commerce),
        country: request.country.clone().unwrap_or(base.country),
        parent_company: request
            .parent_company
            .clone()
            .unwrap_or(base.parent_company),
    }
}
