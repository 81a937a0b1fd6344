//! Build run tracking
//!
//! ```text
//! RunRecord (one per task per build)
//!     ├──< MetricRecord (N) [per-epoch train/val loss and metric]
//!     └──< ArtifactRecord (0..1) [published file + content hash]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use apexrun_ml::quant::QuantizationMode;
//! use apexrun_ml::task::Task;
//! use apexrun_ml::tracking::{MetricRecord, RunRecord, RunStatus, RunStore};
//!
//! let mut store = RunStore::new();
//! let mut run = RunRecord::new("gait_form-1", Task::GaitForm, QuantizationMode::Float16);
//! run.start();
//! store.add_metric(MetricRecord::new(run.run_id(), "val_loss", 1, 0.42));
//! run.succeed();
//! store.upsert_run(run);
//!
//! assert_eq!(store.latest_run(Task::GaitForm).unwrap().status(), RunStatus::Success);
//! ```

mod artifact_record;
mod metric_record;
mod run_record;
mod store;

pub use artifact_record::ArtifactRecord;
pub use metric_record::MetricRecord;
pub use run_record::{RunRecord, RunStatus};
pub use store::{RunStore, RunSummary};
