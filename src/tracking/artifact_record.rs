//! Artifact Record - what a successful run published

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A published artifact, identified by its trailing content hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    run_id: String,
    filename: String,
    content_hash: String,
    size_bytes: u64,
    created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Create a new artifact record.
    ///
    /// # Arguments
    ///
    /// * `run_id` - ID of the run that produced it
    /// * `filename` - Stored filename
    /// * `content_hash` - Hex content hash from the artifact trailer
    /// * `size_bytes` - Stored size
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        filename: impl Into<String>,
        content_hash: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            filename: filename.into(),
            content_hash: content_hash.into(),
            size_bytes,
            created_at: Utc::now(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the stored filename.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Get the content hash.
    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Get the size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
