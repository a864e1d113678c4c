//! Trained input encoding: feature order, categorical vocabularies, numeric
//! transform, output classes. Shipped as a JSON artifact next to the model.

use super::ClassifierError;
use crate::features::{FeatureValue, FeatureVector, FEATURE_NAMES};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSchema {
    /// Must equal [`FEATURE_NAMES`] exactly, in order.
    pub feature_names: Vec<String>,
    /// Output class labels in the model's output order.
    pub classes: Vec<String>,
    /// Categorical features and their trained vocabularies. A value outside
    /// the vocabulary encodes to all zeros.
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    /// Apply log1p(max(x, 0)) to numeric features, as at training time.
    #[serde(default = "default_true")]
    pub log_scale_numeric: bool,
}

impl ModelSchema {
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ClassifierError::ModelUnavailable(format!("{}: {e}", path.display())))?;
        let schema: ModelSchema = serde_json::from_str(&data)
            .map_err(|e| ClassifierError::SchemaMismatch(e.to_string()))?;
        schema.validate()?;
        Ok(schema)
    }

    /// Reject any divergence from the crate's feature contract up front.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.feature_names != FEATURE_NAMES {
            return Err(ClassifierError::SchemaMismatch(format!(
                "expected features {:?}, schema has {:?}",
                FEATURE_NAMES, self.feature_names
            )));
        }
        if self.classes.is_empty() {
            return Err(ClassifierError::SchemaMismatch(
                "schema declares no output classes".to_string(),
            ));
        }
        for name in self.categories.keys() {
            if !self.feature_names.iter().any(|f| f == name) {
                return Err(ClassifierError::SchemaMismatch(format!(
                    "vocabulary for unknown feature {name}"
                )));
            }
        }
        Ok(())
    }

    /// Width of the encoded input tensor.
    pub fn input_dim(&self) -> usize {
        self.feature_names
            .iter()
            .map(|name| self.categories.get(name).map(|v| v.len()).unwrap_or(1))
            .sum()
    }

    /// Encode a feature vector into the model's f32 input layout.
    pub fn encode(&self, features: &FeatureVector) -> Result<Vec<f32>, ClassifierError> {
        let mut out = Vec::with_capacity(self.input_dim());
        for name in &self.feature_names {
            let value = features.value(name).ok_or_else(|| {
                ClassifierError::SchemaMismatch(format!("feature vector is missing {name}"))
            })?;
            match (self.categories.get(name), value) {
                (Some(vocab), FeatureValue::Text(text)) => {
                    for entry in vocab {
                        out.push(if entry == text { 1.0 } else { 0.0 });
                    }
                }
                (Some(_), FeatureValue::Number(_)) => {
                    return Err(ClassifierError::SchemaMismatch(format!(
                        "{name} is numeric but the schema declares a vocabulary"
                    )));
                }
                (None, FeatureValue::Number(n)) => {
                    let n = if self.log_scale_numeric {
                        (n.max(0.0)).ln_1p()
                    } else {
                        n
                    };
                    out.push(n as f32);
                }
                (None, FeatureValue::Text(_)) => {
                    return Err(ClassifierError::SchemaMismatch(format!(
                        "{name} is categorical but the schema has no vocabulary for it"
                    )));
                }
            }
        }
        Ok(out)
    }
}
