//! Build pipeline: synthesize → train → normalize → convert → publish
//!
//! Each task runs under its store lock and is isolated from the others: a
//! failure is recorded against that task and the remaining tasks still
//! build. The summary's status is `success` when every task published,
//! `partial` when some did, `failed` when none did.

use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::artifact::{Artifact, ArtifactMetadata};
use crate::backend::{ModelBackend, TrainingReport};
use crate::config::Config;
use crate::dataset::synthesize;
use crate::normalization::NormalizationParams;
use crate::quant::{QuantizationScheme, MAX_CALIBRATION_ROWS};
use crate::store::ArtifactStore;
use crate::task::Task;
use crate::tracking::{ArtifactRecord, MetricRecord, RunRecord, RunStore};
use crate::Result;

static RUN_SEQ: AtomicU64 = AtomicU64::new(0);

/// Overall outcome of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    /// Every task published
    Success,
    /// At least one task published, at least one failed
    Partial,
    /// No task published
    Failed,
}

/// Result of a build over all tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    /// Overall status
    pub status: BuildStatus,
    /// Metadata of every published artifact, by task name
    pub models: BTreeMap<String, ArtifactMetadata>,
    /// Failure message of every failed task, by task name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl BuildSummary {
    fn from_outcomes(outcomes: Vec<(Task, Result<ArtifactMetadata>)>) -> Self {
        let mut models = BTreeMap::new();
        let mut errors = BTreeMap::new();
        for (task, outcome) in outcomes {
            match outcome {
                Ok(meta) => {
                    models.insert(task.name().to_string(), meta);
                }
                Err(e) => {
                    errors.insert(task.name().to_string(), e.to_string());
                }
            }
        }
        let status = match (models.is_empty(), errors.is_empty()) {
            (true, _) => BuildStatus::Failed,
            (false, true) => BuildStatus::Success,
            (false, false) => BuildStatus::Partial,
        };
        Self {
            status,
            models,
            errors,
        }
    }

    /// Total size of published artifacts in KiB.
    #[must_use]
    pub fn total_kb(&self) -> f64 {
        self.models.values().map(|m| m.size_kb).sum()
    }
}

/// Drives the per-task build stages against a store and a backend.
pub struct BuildPipeline<'a> {
    config: &'a Config,
    store: &'a ArtifactStore,
    backend: &'a dyn ModelBackend,
    runs: &'a Mutex<RunStore>,
}

impl<'a> BuildPipeline<'a> {
    /// Create a pipeline.
    #[must_use]
    pub fn new(
        config: &'a Config,
        store: &'a ArtifactStore,
        backend: &'a dyn ModelBackend,
        runs: &'a Mutex<RunStore>,
    ) -> Self {
        Self {
            config,
            store,
            backend,
            runs,
        }
    }

    /// Build every task sequentially.
    #[must_use]
    pub fn build_all(&self) -> BuildSummary {
        self.build(&Task::ALL)
    }

    /// Build the given tasks sequentially.
    #[must_use]
    pub fn build(&self, tasks: &[Task]) -> BuildSummary {
        info!(
            tasks = tasks.len(),
            backend = self.backend.name(),
            quantization = %self.config.quantization,
            "Build started"
        );
        let outcomes = tasks
            .iter()
            .map(|&task| (task, self.build_task(task)))
            .collect();
        let summary = BuildSummary::from_outcomes(outcomes);
        info!(
            status = ?summary.status,
            built = summary.models.len(),
            failed = summary.errors.len(),
            total_kb = summary.total_kb(),
            "Build finished"
        );
        summary
    }

    /// Build one task, recording its run.
    ///
    /// # Errors
    ///
    /// Returns the first error of any stage; the run is marked failed.
    pub fn build_task(&self, task: Task) -> Result<ArtifactMetadata> {
        let run_id = format!(
            "{task}-{}-{}",
            Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
            RUN_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let mut run = RunRecord::new(run_id.as_str(), task, self.config.quantization);
        self.track(|runs| runs.upsert_run(run.clone()));

        let outcome = self.store.with_task_lock(task, || {
            run.start();
            self.track(|runs| runs.upsert_run(run.clone()));
            self.stages(task, &run_id)
        });

        match outcome {
            Ok((artifact, report)) => {
                run.record_training(report.best_epoch, report.stop_reason);
                run.succeed();
                let meta = artifact.metadata().clone();
                self.track(|runs| {
                    record_metrics(runs, &run_id, &report);
                    runs.add_artifact(ArtifactRecord::new(
                        run_id.as_str(),
                        meta.filename.as_str(),
                        meta.content_hash.as_str(),
                        meta.size_bytes,
                    ));
                    runs.upsert_run(run);
                });
                Ok(meta)
            }
            Err(e) => {
                warn!(task = %task, error = %e, "Task build failed");
                run.fail(e.to_string());
                self.track(|runs| runs.upsert_run(run));
                Err(e)
            }
        }
    }

    fn stages(&self, task: Task, run_id: &str) -> Result<(Artifact, TrainingReport)> {
        info!(task = %task, run_id, samples = self.config.samples, "Synthesizing dataset");
        let dataset = synthesize(task, self.config.samples)?;

        if let Some(dir) = &self.config.snapshot_dir {
            fs::create_dir_all(dir)?;
            let path = dir.join(format!("{task}.parquet"));
            dataset.write_parquet(&path)?;
            info!(task = %task, path = %path.display(), "Dataset snapshot written");
        }

        let model = self
            .backend
            .train(&task.model_spec(), &dataset, &self.config.hyperparameters())?;

        let normalization = NormalizationParams::from_dataset(&dataset)?;
        let scheme =
            QuantizationScheme::for_mode(self.config.quantization, dataset.head(MAX_CALIBRATION_ROWS));
        info!(task = %task, quantization = %scheme.mode(), "Converting model");
        let artifact = self.backend.convert(&model, &scheme)?;

        self.store.publish(&artifact, &normalization)?;
        Ok((artifact, model.report))
    }

    fn track(&self, f: impl FnOnce(&mut RunStore)) {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut runs);
    }
}

fn record_metrics(runs: &mut RunStore, run_id: &str, report: &TrainingReport) {
    let metric_key = format!("val_{}", report.metric);
    for stats in &report.history {
        let epoch = stats.epoch as u64;
        runs.add_metric(MetricRecord::new(run_id, "train_loss", epoch, f64::from(stats.train_loss)));
        runs.add_metric(MetricRecord::new(run_id, "val_loss", epoch, f64::from(stats.val_loss)));
        runs.add_metric(MetricRecord::new(run_id, metric_key.as_str(), epoch, f64::from(stats.val_metric)));
        runs.add_metric(MetricRecord::new(run_id, "learning_rate", epoch, f64::from(stats.learning_rate)));
    }
}
