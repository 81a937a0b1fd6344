//! Service configuration
//!
//! ```rust
//! use apexrun_ml::config::Config;
//! use apexrun_ml::quant::QuantizationMode;
//!
//! let config = Config::builder()
//!     .models_dir("/tmp/apexrun-models")
//!     .quantization(QuantizationMode::Int8)
//!     .epochs(20)
//!     .build()?;
//! assert_eq!(config.hyperparameters().epochs, 20);
//! # Ok::<(), apexrun_ml::Error>(())
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendKind, Hyperparameters};
use crate::quant::QuantizationMode;
use crate::{Error, Result};

/// Default number of synthetic samples per task.
pub const DEFAULT_SAMPLES: usize = 5_000;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding artifacts and normalization params
    pub models_dir: PathBuf,
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Numeric backend
    pub backend: BackendKind,
    /// Export quantization for every task
    pub quantization: QuantizationMode,
    /// Synthetic samples per task
    pub samples: usize,
    /// Epoch cap
    pub epochs: usize,
    /// Mini-batch size
    pub batch_size: usize,
    /// Wall-clock ceiling per task, in seconds
    pub max_training_secs: u64,
    /// Where to write Parquet snapshots of generated datasets, if anywhere
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let hyper = Hyperparameters::default();
        Self {
            models_dir: PathBuf::from("models"),
            host: "0.0.0.0".to_string(),
            port: 8001,
            backend: BackendKind::default(),
            quantization: QuantizationMode::default(),
            samples: DEFAULT_SAMPLES,
            epochs: hyper.epochs,
            batch_size: hyper.batch_size,
            max_training_secs: hyper.max_duration.map_or(600, |d| d.as_secs()),
            snapshot_dir: None,
        }
    }
}

impl Config {
    /// Start a builder from the defaults.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Training hyperparameters implied by this config.
    #[must_use]
    pub fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters {
            epochs: self.epochs,
            batch_size: self.batch_size,
            max_duration: Some(Duration::from_secs(self.max_training_secs)),
            ..Hyperparameters::default()
        }
    }

    /// `host:port`
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the models directory.
    #[must_use]
    pub fn models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.models_dir = dir.into();
        self
    }

    /// Set the bind host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the bind port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the backend kind.
    #[must_use]
    pub const fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set the export quantization.
    #[must_use]
    pub const fn quantization(mut self, mode: QuantizationMode) -> Self {
        self.config.quantization = mode;
        self
    }

    /// Set the synthetic sample count.
    #[must_use]
    pub const fn samples(mut self, samples: usize) -> Self {
        self.config.samples = samples;
        self
    }

    /// Set the epoch cap.
    #[must_use]
    pub const fn epochs(mut self, epochs: usize) -> Self {
        self.config.epochs = epochs;
        self
    }

    /// Set the mini-batch size.
    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    /// Set the wall-clock ceiling per task.
    #[must_use]
    pub const fn max_training_secs(mut self, secs: u64) -> Self {
        self.config.max_training_secs = secs;
        self
    }

    /// Write Parquet snapshots of generated datasets to `dir`.
    #[must_use]
    pub fn snapshot_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.config.snapshot_dir = dir;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if a count is zero.
    pub fn build(self) -> Result<Config> {
        let c = &self.config;
        if c.samples < 2 {
            return Err(Error::Validation(
                "at least 2 samples are needed to split training and validation".to_string(),
            ));
        }
        if c.epochs == 0 || c.batch_size == 0 {
            return Err(Error::Validation(
                "epochs and batch size must be positive".to_string(),
            ));
        }
        if c.max_training_secs == 0 {
            return Err(Error::Validation(
                "training time limit must be positive".to_string(),
            ));
        }
        Ok(self.config)
    }
}
