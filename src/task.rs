//! Task identifiers and the per-task feature contract
//!
//! The feature order declared here is the single source of truth: the
//! synthesizer emits columns in this order, the trainer consumes them in this
//! order, normalization params are published in this order and inference
//! validates against its length.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One of the three trainable models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Running form score from gait biomechanics (regression, 0-100)
    GaitForm,
    /// Injury risk class from biomechanics + load (3-way classification)
    InjuryRisk,
    /// 5K race time from training history (regression, seconds)
    Performance,
}

/// Shape of a model's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Single scalar, trained with mean-squared error
    Regression,
    /// Probability distribution over `n` classes, trained with cross-entropy
    Classification {
        /// Number of classes
        classes: usize,
    },
}

impl OutputKind {
    /// Width of the output tensor.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::Regression => 1,
            Self::Classification { classes } => classes,
        }
    }
}

/// Architecture descriptor for a task's MLP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Task this spec belongs to
    pub task: Task,
    /// Input dimensionality (matches `Task::feature_names().len()`)
    pub input_dim: usize,
    /// Output kind
    pub output: OutputKind,
    /// Hidden layer widths (ReLU activations)
    pub hidden: Vec<usize>,
    /// Dropout rate applied after each hidden layer during training
    pub dropout: Vec<f32>,
    /// Initial Adam learning rate
    pub learning_rate: f32,
}

const GAIT_FEATURES: [&str; 8] = [
    "ground_contact_time_ms",
    "vertical_oscillation_cm",
    "cadence_spm",
    "stride_length_m",
    "forward_lean_degrees",
    "hip_drop_degrees",
    "arm_swing_symmetry_pct",
    "avg_pace_min_per_km",
];

const INJURY_FEATURES: [&str; 7] = [
    "ground_contact_time_ms",
    "vertical_oscillation_cm",
    "cadence_spm",
    "stride_length_m",
    "hip_drop_degrees",
    "weekly_distance_km",
    "acute_chronic_ratio",
];

const PERFORMANCE_FEATURES: [&str; 6] = [
    "weekly_distance_km",
    "avg_pace_min_per_km",
    "run_count_per_week",
    "longest_run_km",
    "resting_heart_rate",
    "hrv_rmssd",
];

impl Task {
    /// All tasks in build order.
    pub const ALL: [Self; 3] = [Self::GaitForm, Self::InjuryRisk, Self::Performance];

    /// Stable snake_case name used in URLs, filenames and JSON.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GaitForm => "gait_form",
            Self::InjuryRisk => "injury_risk",
            Self::Performance => "performance",
        }
    }

    /// Human-readable catalog name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::GaitForm => "Gait Form Analysis",
            Self::InjuryRisk => "Injury Risk Prediction",
            Self::Performance => "Performance Prediction",
        }
    }

    /// Catalog description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::GaitForm => "Scores running form (0-100) from gait biomechanics",
            Self::InjuryRisk => {
                "Classifies injury risk (low/moderate/high) from biomechanics and training load"
            }
            Self::Performance => "Predicts 5K race time in seconds from training history",
        }
    }

    /// Input feature names, in model input order.
    #[must_use]
    pub const fn feature_names(self) -> &'static [&'static str] {
        match self {
            Self::GaitForm => &GAIT_FEATURES,
            Self::InjuryRisk => &INJURY_FEATURES,
            Self::Performance => &PERFORMANCE_FEATURES,
        }
    }

    /// Declared input dimensionality.
    #[must_use]
    pub const fn input_dim(self) -> usize {
        self.feature_names().len()
    }

    /// Output kind of the task's model.
    #[must_use]
    pub const fn output_kind(self) -> OutputKind {
        match self {
            Self::GaitForm | Self::Performance => OutputKind::Regression,
            Self::InjuryRisk => OutputKind::Classification { classes: 3 },
        }
    }

    /// Fixed synthesizer seed.
    #[must_use]
    pub const fn seed(self) -> u64 {
        match self {
            Self::GaitForm => 42,
            Self::InjuryRisk => 43,
            Self::Performance => 44,
        }
    }

    /// Stable one-byte identifier used in the artifact header.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::GaitForm => 1,
            Self::InjuryRisk => 2,
            Self::Performance => 3,
        }
    }

    /// Inverse of [`Task::id`].
    #[must_use]
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::GaitForm),
            2 => Some(Self::InjuryRisk),
            3 => Some(Self::Performance),
            _ => None,
        }
    }

    /// Artifact filename inside the models directory.
    #[must_use]
    pub fn artifact_filename(self) -> String {
        format!("{}_model.artifact", self.name())
    }

    /// Normalization params filename inside the models directory.
    #[must_use]
    pub fn normalization_filename(self) -> String {
        format!("{}_norm_params.json", self.name())
    }

    /// Resolve a task from its artifact filename.
    #[must_use]
    pub fn from_artifact_filename(filename: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|task| task.artifact_filename() == filename)
    }

    /// Architecture used for this task.
    #[must_use]
    pub fn model_spec(self) -> ModelSpec {
        let dropout = match self {
            Self::GaitForm => vec![0.2, 0.1],
            Self::InjuryRisk => vec![0.3, 0.2],
            Self::Performance => vec![0.2, 0.0],
        };
        ModelSpec {
            task: self,
            input_dim: self.input_dim(),
            output: self.output_kind(),
            hidden: vec![32, 16],
            dropout,
            learning_rate: 0.001,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Task {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|task| task.name() == s)
            .ok_or_else(|| Error::UnknownTask(s.to_string()))
    }
}
