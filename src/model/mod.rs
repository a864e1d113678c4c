//! Classifier boundary: opaque consumer of the assembled feature vector.

mod onnx;
mod schema;

pub use onnx::OnnxClassifier;
pub use schema::ModelSchema;

use crate::features::FeatureVector;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The feature vector does not match the schema the model was trained
    /// against. Fatal; never auto-corrected.
    #[error("model schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("model artifact unavailable: {0}")]
    ModelUnavailable(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Predicted severity label plus optional per-class probabilities
/// (summing to 1.0 within floating-point tolerance).
#[derive(Debug, Clone)]
pub struct ClassPrediction {
    pub label: String,
    pub probabilities: Option<BTreeMap<String, f32>>,
}

pub trait Classifier {
    fn predict(&self, features: &FeatureVector) -> Result<ClassPrediction, ClassifierError>;
}
