//! Metric Record - per-epoch training metrics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One metric data point, keyed by run and metric name and ordered by epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    run_id: String,
    key: String,
    epoch: u64,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// Create a new metric record stamped with the current time.
    ///
    /// # Arguments
    ///
    /// * `run_id` - ID of the parent run
    /// * `key` - Metric name (`train_loss`, `val_loss`, `val_mae`, ...)
    /// * `epoch` - 1-based epoch number
    /// * `value` - Metric value
    #[must_use]
    pub fn new(run_id: impl Into<String>, key: impl Into<String>, epoch: u64, value: f64) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            epoch,
            value,
            timestamp: Utc::now(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the metric name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the epoch number.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Get the value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
