//! Quantization-aware server-side inference
//!
//! Resolves the task, validates the feature vector against the task's
//! contract, loads the stored artifact, and runs it. For `uint8` artifacts
//! the input is quantized with the artifact's input params before the run
//! and the output is dequantized with its output params afterwards, so the
//! caller always gets real values back.

use tracing::debug;

use crate::backend::{BackendCapability, Tensor};
use crate::store::ArtifactStore;
use crate::task::Task;
use crate::{Error, Result};

/// Runs stored artifacts on raw feature vectors.
pub struct InferenceEngine<'a> {
    store: &'a ArtifactStore,
    capability: &'a BackendCapability,
}

impl<'a> InferenceEngine<'a> {
    /// Engine over `store` using the resolved backend capability.
    #[must_use]
    pub const fn new(store: &'a ArtifactStore, capability: &'a BackendCapability) -> Self {
        Self { store, capability }
    }

    /// Predict for a task given by name.
    ///
    /// # Errors
    ///
    /// - `Error::UnknownTask` for an unknown name
    /// - everything [`InferenceEngine::predict`] returns
    pub fn predict_named(&self, task: &str, features: &[f32]) -> Result<(Task, Vec<f32>)> {
        let task: Task = task.parse()?;
        Ok((task, self.predict(task, features)?))
    }

    /// Run the stored artifact of `task` on `features`.
    ///
    /// # Errors
    ///
    /// - `Error::Validation` if `features.len()` differs from the task's
    ///   input dimensionality or a feature is not finite
    /// - `Error::BackendUnavailable` if no backend is loaded
    /// - `Error::NotFound` if the artifact has not been built
    /// - `Error::CorruptArtifact` if the stored bytes cannot be decoded
    pub fn predict(&self, task: Task, features: &[f32]) -> Result<Vec<f32>> {
        validate_features(task, features)?;
        let backend = self.capability.backend()?;
        let artifact = self.store.read_artifact(task)?;

        let input = match artifact.int8_io() {
            Some(io) => Tensor::U8(io.input.quantize_slice(features)),
            None => Tensor::F32(features.to_vec()),
        };
        let output = backend.run(&artifact, &input)?;
        let prediction = match (output, artifact.int8_io()) {
            (Tensor::U8(q), Some(io)) => io.output.dequantize_slice(&q),
            (Tensor::F32(y), None) => y,
            _ => {
                return Err(Error::CorruptArtifact(
                    "backend output dtype disagrees with artifact metadata".to_string(),
                ))
            }
        };

        debug!(
            task = %task,
            quantization = %artifact.metadata().quantization,
            outputs = prediction.len(),
            "Inference complete"
        );
        Ok(prediction)
    }
}

/// Check a feature vector against the contract of `task`.
///
/// # Errors
///
/// Returns `Error::Validation` on a count mismatch or a non-finite value.
pub fn validate_features(task: Task, features: &[f32]) -> Result<()> {
    let expected = task.input_dim();
    if features.len() != expected {
        return Err(Error::Validation(format!(
            "{task} expects {expected} features ({}), got {}",
            task.feature_names().join(", "),
            features.len()
        )));
    }
    if let Some(i) = features.iter().position(|v| !v.is_finite()) {
        return Err(Error::Validation(format!(
            "feature '{}' is not a finite number",
            task.feature_names()[i]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use tempfile::TempDir;

    #[test]
    fn test_feature_count_contract() {
        for task in Task::ALL {
            let f = task.input_dim();
            assert!(validate_features(task, &vec![1.0; f]).is_ok());
            assert!(validate_features(task, &vec![1.0; f - 1]).is_err());
            assert!(validate_features(task, &vec![1.0; f + 1]).is_err());
        }
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut x = vec![1.0; 6];
        x[3] = f32::NAN;
        let err = validate_features(Task::Performance, &x).unwrap_err();
        assert!(err.to_string().contains("longest_run_km"));
    }

    #[test]
    fn test_unbuilt_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let cap = BackendCapability::detect(BackendKind::Native);
        let engine = InferenceEngine::new(&store, &cap);
        assert!(matches!(
            engine.predict(Task::GaitForm, &[0.0; 8]),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_validation_precedes_lookup() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let cap = BackendCapability::detect(BackendKind::Disabled);
        let engine = InferenceEngine::new(&store, &cap);
        assert!(matches!(
            engine.predict_named("sprint", &[0.0; 8]),
            Err(Error::UnknownTask(_))
        ));
        assert!(matches!(
            engine.predict(Task::GaitForm, &[0.0; 2]),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            engine.predict(Task::GaitForm, &[0.0; 8]),
            Err(Error::BackendUnavailable(_))
        ));
    }
}
