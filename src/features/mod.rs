//! Feature vector schema: static entity attributes plus the two history
//! blocks, in a fixed named order the classifier was trained against.

mod assembler;

pub use assembler::{build_training_table, FeatureAssembler, TrainingRow};

use crate::events::{parse_flag, DeviceRecord, ManufacturerRecord};
use serde::{Deserialize, Serialize};

/// Canonical feature order. Changing this order or any name is a breaking
/// change to the classifier contract.
pub const FEATURE_NAMES: [&str; 16] = [
    "risk_class",
    "classification",
    "implanted",
    "quantity_in_commerce",
    "country",
    "parent_company",
    "device_prior_total",
    "device_prior_class_i",
    "device_prior_class_ii",
    "device_prior_class_iii",
    "device_days_since_prior",
    "manufacturer_prior_total",
    "manufacturer_prior_class_i",
    "manufacturer_prior_class_ii",
    "manufacturer_prior_class_iii",
    "manufacturer_days_since_prior",
];

/// Static attributes with every missing value already substituted. The
/// defaults are part of the trained contract: changing one without
/// retraining shifts the decision boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticAttributes {
    pub risk_class: String,
    pub classification: String,
    pub implanted: bool,
    pub quantity_in_commerce: f64,
    pub country: String,
    pub parent_company: String,
}

impl Default for StaticAttributes {
    fn default() -> Self {
        Self {
            risk_class: "Unknown".to_string(),
            classification: "Unknown".to_string(),
            implanted: false,
            quantity_in_commerce: 0.0,
            country: "Unknown".to_string(),
            parent_company: "Independent".to_string(),
        }
    }
}

impl StaticAttributes {
    /// Merge device and manufacturer records, filling gaps with the fixed
    /// defaults. Either record may be absent entirely.
    pub fn from_records(
        device: Option<&DeviceRecord>,
        manufacturer: Option<&ManufacturerRecord>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            risk_class: device
                .and_then(|d| d.risk_class.clone())
                .unwrap_or(defaults.risk_class),
            classification: device
                .and_then(|d| d.classification.clone())
                .unwrap_or(defaults.classification),
            implanted: device
                .map(|d| parse_flag(d.implanted.as_deref()))
                .unwrap_or(defaults.implanted),
            quantity_in_commerce: device
                .and_then(|d| d.quantity_in_commerce)
                .unwrap_or(defaults.quantity_in_commerce),
            country: device
                .and_then(|d| d.country.clone())
                .unwrap_or(defaults.country),
            parent_company: manufacturer
                .and_then(|m| m.parent_company.clone())
                .unwrap_or(defaults.parent_company),
        }
    }
}

/// The assembled row the classifier consumes. Field order mirrors
/// [`FEATURE_NAMES`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub risk_class: String,
    pub classification: String,
    pub implanted: bool,
    pub quantity_in_commerce: f64,
    pub country: String,
    pub parent_company: String,
    pub device_prior_total: u32,
    pub device_prior_class_i: u32,
    pub device_prior_class_ii: u32,
    pub device_prior_class_iii: u32,
    pub device_days_since_prior: i64,
    pub manufacturer_prior_total: u32,
    pub manufacturer_prior_class_i: u32,
    pub manufacturer_prior_class_ii: u32,
    pub manufacturer_prior_class_iii: u32,
    pub manufacturer_days_since_prior: i64,
}

/// One feature value, viewed through the schema encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue<'a> {
    Text(&'a str),
    Number(f64),
}

impl FeatureVector {
    /// Look up a feature by its canonical name. Booleans surface as 0/1
    /// numbers, counts and day deltas as numbers, categoricals as text.
    pub fn value(&self, name: &str) -> Option<FeatureValue<'_>> {
        let v = match name {
            "risk_class" => FeatureValue::Text(&self.risk_class),
            "classification" => FeatureValue::Text(&self.classification),
            "implanted" => FeatureValue::Number(if self.implanted { 1.0 } else { 0.0 }),
            "quantity_in_commerce" => FeatureValue::Number(self.quantity_in_commerce),
            "country" => FeatureValue::Text(&self.country),
            "parent_company" => FeatureValue::Text(&self.parent_company),
            "device_prior_total" => FeatureValue::Number(self.device_prior_total as f64),
            "device_prior_class_i" => FeatureValue::Number(self.device_prior_class_i as f64),
            "device_prior_class_ii" => FeatureValue::Number(self.device_prior_class_ii as f64),
            "device_prior_class_iii" => FeatureValue::Number(self.device_prior_class_iii as f64),
            "device_days_since_prior" => FeatureValue::Number(self.device_days_since_prior as f64),
            "manufacturer_prior_total" => FeatureValue::Number(self.manufacturer_prior_total as f64),
            "manufacturer_prior_class_i" => {
                FeatureValue::Number(self.manufacturer_prior_class_i as f64)
            }
            "manufacturer_prior_class_ii" => {
                FeatureValue::Number(self.manufacturer_prior_class_ii as f64)
            }
            "manufacturer_prior_class_iii" => {
                FeatureValue::Number(self.manufacturer_prior_class_iii as f64)
            }
            "manufacturer_days_since_prior" => {
                FeatureValue::Number(self.manufacturer_days_since_prior as f64)
            }
            _ => return None,
        };
        Some(v)
    }
}
