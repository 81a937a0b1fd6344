//! Catalog entries: the read-only listing view of stored artifacts

use serde::{Deserialize, Serialize};

use crate::artifact::size_kb;
use crate::task::Task;

/// URL prefix under which artifact bytes are served.
pub const DOWNLOAD_PREFIX: &str = "/models/";

/// One listed artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Human-readable model name
    pub name: String,
    /// Artifact filename (download token)
    pub filename: String,
    /// Artifact size in KiB, one decimal
    pub size_kb: f64,
    /// Model description
    pub description: String,
    /// Input feature names in model input order
    pub input_features: Vec<String>,
    /// Relative download URL
    pub download_url: String,
}

impl CatalogEntry {
    /// Entry for `task` whose stored artifact is `size_bytes` long.
    #[must_use]
    pub fn new(task: Task, size_bytes: u64) -> Self {
        let filename = task.artifact_filename();
        Self {
            name: task.display_name().to_string(),
            download_url: format!("{DOWNLOAD_PREFIX}{filename}"),
            filename,
            size_kb: size_kb(size_bytes),
            description: task.description().to_string(),
            input_features: task
                .feature_names()
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}
