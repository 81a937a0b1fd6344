//! Run Record - one task's pass through a build

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::StopReason;
use crate::quant::QuantizationMode;
use crate::task::Task;

/// Status of a build run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, waiting for the task's build lock.
    Pending,
    /// Training or exporting.
    Running,
    /// Artifact and normalization params published.
    Success,
    /// Failed; see `error`.
    Failed,
}

impl RunStatus {
    /// True once the run has succeeded or failed.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// A single task build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    run_id: String,
    task: Task,
    quantization: QuantizationMode,
    status: RunStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    best_epoch: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl RunRecord {
    /// Create a new run record in Pending status.
    #[must_use]
    pub fn new(run_id: impl Into<String>, task: Task, quantization: QuantizationMode) -> Self {
        Self {
            run_id: run_id.into(),
            task,
            quantization,
            status: RunStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            best_epoch: None,
            stop_reason: None,
            error: None,
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the task.
    #[must_use]
    pub const fn task(&self) -> Task {
        self.task
    }

    /// Get the export quantization mode.
    #[must_use]
    pub const fn quantization(&self) -> QuantizationMode {
        self.quantization
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the start timestamp, if started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if finished.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Epoch whose weights were restored.
    #[must_use]
    pub const fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Why training ended.
    #[must_use]
    pub const fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// Failure message of a failed run.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Transition Pending → Running.
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record how training ended.
    pub fn record_training(&mut self, best_epoch: usize, stop_reason: StopReason) {
        self.best_epoch = Some(best_epoch);
        self.stop_reason = Some(stop_reason);
    }

    /// Finish successfully.
    pub fn succeed(&mut self) {
        self.status = RunStatus::Success;
        self.ended_at = Some(Utc::now());
    }

    /// Finish with an error.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.ended_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_default() {
        let run = RunRecord::new("run-1", Task::GaitForm, QuantizationMode::Float16);
        assert_eq!(run.status(), RunStatus::Pending);
        assert!(run.started_at().is_none());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut run = RunRecord::new("run-1", Task::GaitForm, QuantizationMode::Float16);
        run.start();
        assert_eq!(run.status(), RunStatus::Running);
        run.record_training(12, StopReason::EarlyStopping);
        run.succeed();
        assert_eq!(run.status(), RunStatus::Success);
        assert_eq!(run.best_epoch(), Some(12));
        assert!(run.ended_at() >= run.started_at());
    }

    #[test]
    fn test_failed_run_keeps_error() {
        let mut run = RunRecord::new("run-2", Task::Performance, QuantizationMode::Int8);
        run.start();
        run.fail("loss diverged");
        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.error(), Some("loss diverged"));

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["task"], "performance");
    }
}
