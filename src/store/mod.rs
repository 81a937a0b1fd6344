//! Artifact store and catalog
//!
//! A single models directory holds, per task, one artifact file and one
//! normalization-params file, both named after the task. The store is the
//! only component that touches that directory.
//!
//! ## Publication
//!
//! - Builds for the same task are serialized by a per-task lock
//!   ([`ArtifactStore::with_task_lock`]); a second build waits.
//! - Files are written to a temp file in the same directory, fsynced, then
//!   renamed over the old file, so readers see the old or the new bytes.
//! - The normalization file is written first and the artifact last. If the
//!   artifact write fails, the previous normalization file is put back (or
//!   the new one removed when there was none), so the pair on disk always
//!   belongs to the same build.
//! - Artifacts carry a trailing content hash, so a reader that still manages
//!   to see a torn file gets `CorruptArtifact` instead of garbage.

mod catalog;

pub use catalog::{CatalogEntry, DOWNLOAD_PREFIX};

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::normalization::NormalizationParams;
use crate::task::Task;
use crate::{Error, Result};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Keyed directory of artifacts and normalization params.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    locks: DashMap<Task, Arc<Mutex<()>>>,
}

impl ArtifactStore {
    /// Open (and create if needed) the models directory.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "Artifact store opened");
        Ok(Self {
            dir,
            locks: DashMap::new(),
        })
    }

    /// Models directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the artifact for `task`.
    #[must_use]
    pub fn artifact_path(&self, task: Task) -> PathBuf {
        self.dir.join(task.artifact_filename())
    }

    /// Path of the normalization params for `task`.
    #[must_use]
    pub fn normalization_path(&self, task: Task) -> PathBuf {
        self.dir.join(task.normalization_filename())
    }

    /// Run `f` while holding the build lock for `task`.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub fn with_task_lock<T>(&self, task: Task, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = Arc::clone(self.locks.entry(task).or_default().value());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(task = %task, "Build lock acquired");
        f()
    }

    /// Atomically publish the artifact and normalization params of a task.
    ///
    /// Normalization is written first and the artifact last; a failed
    /// artifact write rolls the normalization file back to what it was.
    ///
    /// # Errors
    ///
    /// Returns an IO or JSON error if either file cannot be written.
    pub fn publish(&self, artifact: &Artifact, normalization: &NormalizationParams) -> Result<()> {
        let task = artifact.task();
        normalization.validate(task)?;
        let json = serde_json::to_vec_pretty(normalization)?;

        let norm_path = self.normalization_path(task);
        let previous = match fs::read(&norm_path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        write_atomic(&norm_path, &json)?;

        if let Err(e) = write_atomic(&self.artifact_path(task), artifact.bytes()) {
            let restored = match previous {
                Some(bytes) => write_atomic(&norm_path, &bytes),
                None => fs::remove_file(&norm_path).map_err(Error::from),
            };
            if let Err(restore) = restored {
                warn!(task = %task, error = %restore, "Normalization rollback failed");
            }
            warn!(task = %task, error = %e, "Artifact write failed, normalization rolled back");
            return Err(e);
        }
        info!(
            task = %task,
            bytes = artifact.bytes().len(),
            quantization = %artifact.metadata().quantization,
            "Artifact published"
        );
        Ok(())
    }

    /// Load and verify the artifact for `task`.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` if not built, `Error::CorruptArtifact` if unreadable.
    pub fn read_artifact(&self, task: Task) -> Result<Artifact> {
        let bytes = read_or_not_found(&self.artifact_path(task), &task.artifact_filename())?;
        Artifact::from_bytes(bytes)
    }

    /// Exact stored bytes for a catalog filename.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` if the filename is not a known artifact name or the
    /// artifact has not been built.
    pub fn download(&self, filename: &str) -> Result<Vec<u8>> {
        let task = Task::from_artifact_filename(filename)
            .ok_or_else(|| Error::NotFound(format!("model file '{filename}'")))?;
        read_or_not_found(&self.artifact_path(task), filename)
    }

    /// Normalization params for `task`.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` if not exported.
    pub fn read_normalization(&self, task: Task) -> Result<NormalizationParams> {
        let bytes = read_or_not_found(
            &self.normalization_path(task),
            &task.normalization_filename(),
        )?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Catalog entries for every task whose artifact exists.
    ///
    /// # Errors
    ///
    /// Returns an IO error other than "not found" while inspecting files.
    pub fn catalog(&self) -> Result<Vec<CatalogEntry>> {
        let mut entries = Vec::new();
        for task in Task::ALL {
            match fs::metadata(self.artifact_path(task)) {
                Ok(meta) if meta.is_file() => entries.push(CatalogEntry::new(task, meta.len())),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(entries)
    }
}

fn read_or_not_found(path: &Path, name: &str) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            Error::NotFound(name.to_string())
        } else {
            Error::Io(e)
        }
    })
}

/// Write `bytes` to a sibling temp file, fsync, and rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Other(format!("{} has no parent directory", path.display())))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(
        ".{name}.{}.{}.tmp",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let written = (|| -> io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
