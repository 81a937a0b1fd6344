//! Error types for the model lifecycle service
//!
//! Every variant maps to exactly one HTTP class (see `server`): validation
//! problems are the caller's to fix, missing artifacts are fixed by a build,
//! everything else is internal.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Service error types
#[derive(Error, Debug)]
pub enum Error {
    /// Request or argument failed validation (feature count, sample count, ...)
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Task name is not one of the known tasks
    #[error("Unknown model '{0}'. Expected one of: gait_form, injury_risk, performance")]
    UnknownTask(String),

    /// Artifact, normalization params or catalog file not present
    #[error("Not found: {0}\nTrigger POST /models/build to generate the models")]
    NotFound(String),

    /// Training/quantization/runtime backend is not available in this process
    #[error("Model backend unavailable: {0}\nUse the rule-based endpoints under /api/v1 instead")]
    BackendUnavailable(String),

    /// Training or export failed for a single task
    #[error("Training failed for {task}: {reason}")]
    TrainingFailure {
        /// Task whose pipeline failed
        task: String,
        /// Failure description
        reason: String,
    },

    /// Artifact bytes exist but cannot be decoded
    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Arrow error (dataset snapshots)
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error (dataset snapshots)
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Convenience constructor for a task-scoped training failure.
    pub fn training(task: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TrainingFailure {
            task: task.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the caller (never retried, reported as 4xx).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::UnknownTask(_) | Self::NotFound(_)
        )
    }
}
