//! ONNX Runtime classifier. Input: [1, input_dim] f32 per the model schema;
//! output: one probability per class. Uses `ort`; if the model file is
//! missing, the classifier loads in disabled mode and every predict fails
//! with `ModelUnavailable`.

use super::{ClassPrediction, Classifier, ClassifierError, ModelSchema};
use crate::features::FeatureVector;
use ndarray::{Array2, CowArray};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

static ORT_ENV: OnceLock<Arc<ort::Environment>> = OnceLock::new();

fn init_env() -> Arc<ort::Environment> {
    ORT_ENV
        .get_or_init(|| {
            ort::Environment::builder()
                .with_name("recall-engine")
                .build()
                .expect("ORT environment")
                .into()
        })
        .clone()
}

pub struct OnnxClassifier {
    session: Option<ort::Session>,
    schema: ModelSchema,
}

impl OnnxClassifier {
    /// Load the model alongside its validated schema artifact. A missing
    /// model file is not fatal here so that history-only workflows run
    /// without an artifact.
    pub fn load(model_path: &Path, schema: ModelSchema) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            tracing::warn!(path = %model_path.display(), "ONNX model not found; inference disabled");
            return Ok(Self {
                session: None,
                schema,
            });
        }

        let environment = init_env();
        let session = ort::SessionBuilder::new(&environment)
            .map_err(|e| ClassifierError::ModelUnavailable(e.to_string()))?
            .with_model_from_file(model_path)
            .map_err(|e| ClassifierError::ModelUnavailable(e.to_string()))?;

        Ok(Self {
            session: Some(session),
            schema,
        })
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, features: &FeatureVector) -> Result<ClassPrediction, ClassifierError> {
        let Some(ref session) = self.session else {
            return Err(ClassifierError::ModelUnavailable(
                "no model loaded".to_string(),
            ));
        };

        let encoded = self.schema.encode(features)?;
        let dim = encoded.len();
        let array = CowArray::from(
            Array2::from_shape_vec((1, dim), encoded)
                .map_err(|e| ClassifierError::Inference(e.to_string()))?
                .into_dyn(),
        );
        let input = ort::Value::from_array(session.allocator(), &array)
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let outputs = session
            .run(vec![input])
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        let tensor = outputs
            .first()
            .ok_or_else(|| ClassifierError::Inference("model produced no output".to_string()))?
            .try_extract::<f32>()
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        let view = tensor.view();
        let scores: Vec<f32> = view.iter().copied().collect();
        if scores.len() != self.schema.classes.len() {
            return Err(ClassifierError::Inference(format!(
                "expected {} class scores, got {}",
                self.schema.classes.len(),
                scores.len()
            )));
        }

        // Tree ensembles sometimes emit unnormalized votes; renormalize so
        // the probabilities sum to 1.
        let sum: f32 = scores.iter().sum();
        let probs: Vec<f32> = if sum > 0.0 {
            scores.iter().map(|s| s / sum).collect()
        } else {
            scores
        };

        let best = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| idx)
            .ok_or_else(|| ClassifierError::Inference("empty class scores".to_string()))?;

        let probabilities: BTreeMap<String, f32> = self
            .schema
            .classes
            .iter()
            .cloned()
            .zip(probs.iter().copied())
            .collect();

        Ok(ClassPrediction {
            label: self.schema.classes[best].clone(),
            probabilities: Some(probabilities),
        })
    }
}
