//! Published normalization parameters
//!
//! Per-feature arithmetic mean and population standard deviation over every
//! sample of the dataset a model was trained on, in feature-contract order.
//! On-device callers apply `(x - mean) / std`; nothing on the server's own
//! train or inference path reads these.

use serde::{Deserialize, Serialize};
use trueno::Vector;

use crate::dataset::Dataset;
use crate::task::Task;
use crate::{Error, Result};

/// `{mean, std}` for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationParams {
    /// Per-feature mean
    pub mean: Vec<f32>,
    /// Per-feature population standard deviation
    pub std: Vec<f32>,
}

impl NormalizationParams {
    /// Compute params over all samples of `dataset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the dataset is empty.
    pub fn from_dataset(dataset: &Dataset) -> Result<Self> {
        if dataset.is_empty() {
            return Err(Error::Validation(
                "cannot compute normalization over an empty dataset".to_string(),
            ));
        }
        let (mean, std) = (0..dataset.n_features())
            .map(|j| population_mean_std(&dataset.column(j)))
            .unzip();
        Ok(Self { mean, std })
    }

    /// Number of features covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    /// True if no features are covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    /// Check the params against the feature contract of `task`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the lengths disagree.
    pub fn validate(&self, task: Task) -> Result<()> {
        let f = task.input_dim();
        if self.mean.len() != f || self.std.len() != f {
            return Err(Error::Validation(format!(
                "{task} normalization needs {f} means and stds, found {} and {}",
                self.mean.len(),
                self.std.len()
            )));
        }
        Ok(())
    }
}

/// Arithmetic mean and population standard deviation, both Kahan-summed.
///
/// An empty slice gives `(0.0, 0.0)`.
pub(crate) fn population_mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = kahan_sum(values) / n;
    let squared: Vec<f32> = values.iter().map(|v| (v - mean) * (v - mean)).collect();
    (mean, (kahan_sum(&squared) / n).sqrt())
}

fn kahan_sum(values: &[f32]) -> f32 {
    Vector::from_slice(values)
        .sum_kahan()
        .unwrap_or_else(|_| values.iter().sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{synthesize, Labels};

    #[test]
    fn test_population_statistics() {
        let features = vec![
            2.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
            4.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
            4.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
            6.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        ];
        let ds = Dataset::new(Task::Performance, features, Labels::Regression(vec![0.0; 4]))
            .unwrap();
        let params = NormalizationParams::from_dataset(&ds).unwrap();
        assert!((params.mean[0] - 4.0).abs() < 1e-6);
        // population: sqrt((4 + 0 + 0 + 4) / 4)
        assert!((params.std[0] - 2.0_f32.sqrt()).abs() < 1e-6);
        assert_eq!(params.std[1], 0.0);
    }

    #[test]
    fn test_population_mean_std() {
        let (mean, std) = population_mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-6);
        assert!((std - 2.0).abs() < 1e-6);
        assert_eq!(population_mean_std(&[3.0, 3.0]), (3.0, 0.0));
        assert_eq!(population_mean_std(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_feature_order_matches_contract() {
        let ds = synthesize(Task::GaitForm, 1000).unwrap();
        let params = NormalizationParams::from_dataset(&ds).unwrap();
        params.validate(Task::GaitForm).unwrap();
        // gct ~ U(180, 350), cadence ~ U(140, 200)
        assert!((params.mean[0] - 265.0).abs() < 10.0);
        assert!((params.mean[2] - 170.0).abs() < 5.0);
        assert!(params.validate(Task::Performance).is_err());
    }

    #[test]
    fn test_json_shape() {
        let params = NormalizationParams {
            mean: vec![1.0, 2.0],
            std: vec![0.5, 0.25],
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json, serde_json::json!({"mean": [1.0, 2.0], "std": [0.5, 0.25]}));
    }
}
