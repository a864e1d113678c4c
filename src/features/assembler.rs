//! Assembles feature vectors and builds the offline training table.

use super::{FeatureVector, StaticAttributes};
use crate::events::{DeviceRecord, ManufacturerRecord, RecallEvent, SeverityClass};
use crate::history::{exclusive_histories, resolve_event_time, HistoryInput, HistorySnapshot};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

pub struct FeatureAssembler;

impl FeatureAssembler {
    /// Merge substituted static attributes with the two history snapshots
    /// into the fixed-order vector.
    pub fn assemble(
        attrs: &StaticAttributes,
        device: &HistorySnapshot,
        manufacturer: &HistorySnapshot,
    ) -> FeatureVector {
        FeatureVector {
            risk_class: attrs.risk_class.clone(),
            classification: attrs.classification.clone(),
            implanted: attrs.implanted,
            quantity_in_commerce: attrs.quantity_in_commerce,
            country: attrs.country.clone(),
            parent_company: attrs.parent_company.clone(),
            device_prior_total: device.total,
            device_prior_class_i: device.class_i,
            device_prior_class_ii: device.class_ii,
            device_prior_class_iii: device.class_iii,
            device_days_since_prior: device.days_since_prior,
            manufacturer_prior_total: manufacturer.total,
            manufacturer_prior_class_i: manufacturer.class_i,
            manufacturer_prior_class_ii: manufacturer.class_ii,
            manufacturer_prior_class_iii: manufacturer.class_iii,
            manufacturer_days_since_prior: manufacturer.days_since_prior,
        }
    }
}

/// One labeled training row: the feature vector plus the label the features
/// must never have seen.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingRow {
    pub event_id: String,
    pub label: &'static str,
    #[serde(flatten)]
    pub features: FeatureVector,
}

/// Build the leak-safe training table from a full event log.
///
/// Rows kept: labeled with a known class, tied to a device, and carrying a
/// resolvable event time. The manufacturer key falls back to the device
/// record when the event itself lacks one; rows still missing it get zero
/// manufacturer history.
pub fn build_training_table(
    events: &[RecallEvent],
    devices: &[DeviceRecord],
    manufacturers: &[ManufacturerRecord],
) -> Vec<TrainingRow> {
    let device_index: HashMap<&str, &DeviceRecord> =
        devices.iter().map(|d| (d.id.as_str(), d)).collect();
    let manufacturer_index: HashMap<&str, &ManufacturerRecord> =
        manufacturers.iter().map(|m| (m.id.as_str(), m)).collect();

    let mut unresolved = 0usize;
    let mut kept: Vec<(&RecallEvent, SeverityClass, chrono::NaiveDate, Option<String>)> =
        Vec::new();
    for event in events {
        let severity = event.severity();
        if !severity.is_known() || event.device_id.is_none() {
            continue;
        }
        let Some(time) = resolve_event_time(event) else {
            unresolved += 1;
            continue;
        };
        let manufacturer_id = event.manufacturer_id.clone().or_else(|| {
            event
                .device_id
                .as_deref()
                .and_then(|id| device_index.get(id))
                .and_then(|d| d.manufacturer_id.clone())
        });
        kept.push((event, severity, time, manufacturer_id));
    }
    if unresolved > 0 {
        info!(count = unresolved, "events dropped: no resolvable event time");
    }

    let device_rows: Vec<HistoryInput> = kept
        .iter()
        .map(|(event, severity, time, _)| HistoryInput {
            key: event.device_id.clone(),
            severity: *severity,
            time: *time,
        })
        .collect();
    let manufacturer_rows: Vec<HistoryInput> = kept
        .iter()
        .map(|(_, severity, time, manufacturer_id)| HistoryInput {
            key: manufacturer_id.clone(),
            severity: *severity,
            time: *time,
        })
        .collect();

    let device_histories = exclusive_histories(&device_rows);
    let manufacturer_histories = exclusive_histories(&manufacturer_rows);

    kept.iter()
        .zip(device_histories)
        .zip(manufacturer_histories)
        .map(|(((event, severity, _, manufacturer_id), dev_snap), mfr_snap)| {
            let device = event
                .device_id
                .as_deref()
                .and_then(|id| device_index.get(id))
                .copied();
            let manufacturer = manufacturer_id
                .as_deref()
                .and_then(|id| manufacturer_index.get(id))
                .copied();
            let attrs = StaticAttributes::from_records(device, manufacturer);
            TrainingRow {
                event_id: event.id.clone(),
                label: severity.label(),
                features: FeatureAssembler::assemble(&attrs, &dev_snap, &mfr_snap),
            }
        })
        .collect()
}
