//! Run Store - in-memory tracking of build runs
//!
//! Keeps the latest run of each task, plus any older run of that task still
//! in flight. Finished runs that a newer run superseded are dropped together
//! with their metrics and artifacts. Nothing is persisted.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::{ArtifactRecord, MetricRecord, RunRecord};
use crate::task::Task;

/// Latest run of one task with its metrics and artifacts, as served by `/runs`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunSummary {
    /// The run
    pub run: RunRecord,
    /// Metrics ordered by key then epoch
    pub metrics: Vec<MetricRecord>,
    /// Published artifacts
    pub artifacts: Vec<ArtifactRecord>,
}

/// In-memory store for run tracking data.
#[derive(Debug, Default)]
pub struct RunStore {
    runs: HashMap<String, RunRecord>,
    order: Vec<String>,
    metrics: Vec<MetricRecord>,
    artifacts: Vec<ArtifactRecord>,
}

impl RunStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no run was ever recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Number of runs.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Number of metric points.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Number of artifact records.
    #[must_use]
    pub fn artifact_count(&self) -> usize {
        self.artifacts.len()
    }

    /// Insert or replace a run, then drop superseded runs of its task.
    pub fn upsert_run(&mut self, run: RunRecord) {
        let id = run.run_id().to_string();
        let task = run.task();
        if self.runs.insert(id.clone(), run).is_none() {
            self.order.push(id);
        }
        self.prune(task);
    }

    /// Remove finished runs of `task` older than its latest run.
    fn prune(&mut self, task: Task) {
        let Some(latest) = self.latest_run(task).map(|r| r.run_id().to_string()) else {
            return;
        };
        let stale: HashSet<String> = self
            .order
            .iter()
            .filter(|id| **id != latest)
            .filter(|id| {
                self.runs
                    .get(*id)
                    .is_some_and(|r| r.task() == task && r.status().is_finished())
            })
            .cloned()
            .collect();
        if stale.is_empty() {
            return;
        }
        self.order.retain(|id| !stale.contains(id));
        self.runs.retain(|id, _| !stale.contains(id));
        self.metrics.retain(|m| !stale.contains(m.run_id()));
        self.artifacts.retain(|a| !stale.contains(a.run_id()));
    }

    /// Get a run by ID.
    #[must_use]
    pub fn get_run(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    /// Most recently created run of `task`.
    #[must_use]
    pub fn latest_run(&self, task: Task) -> Option<&RunRecord> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.runs.get(id))
            .find(|run| run.task() == task)
    }

    /// Add a metric point.
    pub fn add_metric(&mut self, metric: MetricRecord) {
        self.metrics.push(metric);
    }

    /// Add an artifact record.
    pub fn add_artifact(&mut self, artifact: ArtifactRecord) {
        self.artifacts.push(artifact);
    }

    /// Metrics of a run for one key, ordered by epoch.
    #[must_use]
    pub fn metrics_for_run(&self, run_id: &str, key: &str) -> Vec<MetricRecord> {
        let mut metrics: Vec<MetricRecord> = self
            .metrics
            .iter()
            .filter(|m| m.run_id() == run_id && m.key() == key)
            .cloned()
            .collect();
        metrics.sort_by_key(MetricRecord::epoch);
        metrics
    }

    /// Artifacts published by a run.
    #[must_use]
    pub fn artifacts_for_run(&self, run_id: &str) -> Vec<&ArtifactRecord> {
        self.artifacts
            .iter()
            .filter(|a| a.run_id() == run_id)
            .collect()
    }

    /// Latest run of every task that has one, in task order.
    #[must_use]
    pub fn latest_summaries(&self) -> Vec<RunSummary> {
        Task::ALL
            .into_iter()
            .filter_map(|task| self.latest_run(task))
            .map(|run| {
                let mut metrics: Vec<MetricRecord> = self
                    .metrics
                    .iter()
                    .filter(|m| m.run_id() == run.run_id())
                    .cloned()
                    .collect();
                metrics.sort_by(|a, b| a.key().cmp(b.key()).then(a.epoch().cmp(&b.epoch())));
                RunSummary {
                    run: run.clone(),
                    metrics,
                    artifacts: self
                        .artifacts_for_run(run.run_id())
                        .into_iter()
                        .cloned()
                        .collect(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quant::QuantizationMode;

    #[test]
    fn test_store_default() {
        let store = RunStore::new();
        assert!(store.is_empty());
        assert_eq!(store.run_count(), 0);
        assert!(store.latest_summaries().is_empty());
    }

    #[test]
    fn test_upsert_replaces_without_duplicating() {
        let mut store = RunStore::new();
        let mut run = RunRecord::new("run-1", Task::GaitForm, QuantizationMode::Float16);
        store.upsert_run(run.clone());
        run.start();
        store.upsert_run(run);
        assert_eq!(store.run_count(), 1);
        assert_eq!(
            store.get_run("run-1").unwrap().status(),
            super::super::RunStatus::Running
        );
    }

    fn finished(id: &str, task: Task) -> RunRecord {
        let mut run = RunRecord::new(id, task, QuantizationMode::Float16);
        run.start();
        run.succeed();
        run
    }

    #[test]
    fn test_latest_run_per_task() {
        let mut store = RunStore::new();
        store.upsert_run(finished("a", Task::GaitForm));
        store.upsert_run(finished("b", Task::Performance));
        store.upsert_run(RunRecord::new("c", Task::GaitForm, QuantizationMode::Int8));

        assert_eq!(store.run_count(), 2);
        assert!(store.get_run("a").is_none());
        assert_eq!(store.latest_run(Task::GaitForm).unwrap().run_id(), "c");
        assert!(store.latest_run(Task::InjuryRisk).is_none());
        let summaries = store.latest_summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].run.run_id(), "c");
        assert_eq!(summaries[1].run.run_id(), "b");
    }

    #[test]
    fn test_metrics_ordering() {
        let mut store = RunStore::new();
        store.add_metric(MetricRecord::new("run-1", "val_loss", 2, 0.2));
        store.add_metric(MetricRecord::new("run-1", "val_loss", 1, 0.3));
        store.add_metric(MetricRecord::new("run-1", "train_loss", 1, 0.4));
        store.add_metric(MetricRecord::new("run-2", "val_loss", 1, 0.9));

        let metrics = store.metrics_for_run("run-1", "val_loss");
        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].epoch(), 1);
        assert_eq!(metrics[1].epoch(), 2);
    }

    #[test]
    fn test_rebuilds_do_not_accumulate() {
        let mut store = RunStore::new();
        for build in 0..5 {
            let id = format!("gait-{build}");
            let mut run = RunRecord::new(id.as_str(), Task::GaitForm, QuantizationMode::Float16);
            store.upsert_run(run.clone());
            run.start();
            store.upsert_run(run.clone());
            for epoch in 1..=3 {
                store.add_metric(MetricRecord::new(id.as_str(), "val_loss", epoch, 0.1));
            }
            store.add_artifact(ArtifactRecord::new(id.as_str(), "gait_form_model.artifact", "h", 10));
            run.succeed();
            store.upsert_run(run);
        }

        assert_eq!(store.run_count(), 1);
        assert_eq!(store.metric_count(), 3);
        assert_eq!(store.artifact_count(), 1);
        assert!(store.metrics_for_run("gait-3", "val_loss").is_empty());
        assert!(store.artifacts_for_run("gait-3").is_empty());

        let summaries = store.latest_summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].run.run_id(), "gait-4");
        assert_eq!(summaries[0].metrics.len(), 3);
        assert_eq!(summaries[0].artifacts.len(), 1);
    }

    #[test]
    fn test_in_flight_runs_are_kept() {
        let mut store = RunStore::new();
        let mut first = RunRecord::new("first", Task::InjuryRisk, QuantizationMode::Int8);
        first.start();
        store.upsert_run(first.clone());
        // A second build of the same task queues while the first still runs
        store.upsert_run(RunRecord::new("second", Task::InjuryRisk, QuantizationMode::Int8));
        assert_eq!(store.run_count(), 2);
        assert_eq!(store.latest_run(Task::InjuryRisk).unwrap().run_id(), "second");

        store.add_metric(MetricRecord::new("first", "val_loss", 1, 0.5));
        first.succeed();
        store.upsert_run(first);
        assert_eq!(store.run_count(), 1);
        assert_eq!(store.metric_count(), 0);
        assert_eq!(store.latest_run(Task::InjuryRisk).unwrap().run_id(), "second");
    }
}
