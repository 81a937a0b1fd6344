//! Numeric backend: train, convert, run
//!
//! The pipeline only talks to [`ModelBackend`]. [`NativeBackend`] is the
//! in-crate implementation (dense MLP, Adam, SIMD dot products via trueno).
//! Whether a backend is available at all is resolved once at startup into a
//! [`BackendCapability`]; handlers check it instead of catching failures.

pub mod network;
pub mod trainer;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use network::Network;
pub use trainer::{EpochStats, Hyperparameters, StopReason, TrainedModel, TrainingReport};

use crate::artifact::Artifact;
use crate::dataset::Dataset;
use crate::quant::{DType, QuantParams, QuantizationScheme};
use crate::task::ModelSpec;
use crate::{Error, Result};

/// Flat input/output tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Tensor {
    /// 32-bit float elements
    F32(Vec<f32>),
    /// Affine-quantized elements
    U8(Vec<u8>),
}

impl Tensor {
    /// Element type.
    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::Float32,
            Self::U8(_) => DType::Uint8,
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::U8(v) => v.len(),
        }
    }

    /// True if the tensor has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Train / convert / run primitives.
pub trait ModelBackend: Send + Sync {
    /// Backend name reported by `/health`.
    fn name(&self) -> &'static str;

    /// Train a model for `spec` on `dataset`.
    ///
    /// # Errors
    ///
    /// `Error::Validation` on dataset/spec mismatch, `Error::TrainingFailure`
    /// on numeric divergence.
    fn train(
        &self,
        spec: &ModelSpec,
        dataset: &Dataset,
        hyper: &Hyperparameters,
    ) -> Result<TrainedModel>;

    /// Export a trained model under `scheme`.
    ///
    /// # Errors
    ///
    /// `Error::Validation` if `int8` is requested without usable calibration rows.
    fn convert(&self, model: &TrainedModel, scheme: &QuantizationScheme) -> Result<Artifact>;

    /// Execute an artifact on one input tensor. Input and output dtypes must
    /// match the artifact's declared dtypes.
    ///
    /// # Errors
    ///
    /// `Error::Validation` on dtype or length mismatch.
    fn run(&self, artifact: &Artifact, input: &Tensor) -> Result<Tensor>;
}

/// Configured backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-crate MLP engine
    #[default]
    Native,
    /// No backend; build and inference return 503
    Disabled,
}

impl BackendKind {
    /// Lowercase config name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "native" => Ok(Self::Native),
            "disabled" => Ok(Self::Disabled),
            other => Err(Error::Validation(format!(
                "unknown backend '{other}' (expected native or disabled)"
            ))),
        }
    }
}

/// Backend availability, resolved once at startup.
#[derive(Clone)]
pub enum BackendCapability {
    /// A backend is loaded
    Available(Arc<dyn ModelBackend>),
    /// No backend; carries the reason reported to callers
    Unavailable(String),
}

impl BackendCapability {
    /// Resolve the capability for a configured backend kind.
    #[must_use]
    pub fn detect(kind: BackendKind) -> Self {
        let capability = match kind {
            BackendKind::Native => Self::Available(Arc::new(NativeBackend::new())),
            BackendKind::Disabled => {
                Self::Unavailable("model backend disabled by configuration".to_string())
            }
        };
        info!(backend = capability.name(), "Backend capability resolved");
        capability
    }

    /// The backend, or `Error::BackendUnavailable`.
    ///
    /// # Errors
    ///
    /// Returns `Error::BackendUnavailable` if no backend is loaded.
    pub fn backend(&self) -> Result<&dyn ModelBackend> {
        match self {
            Self::Available(backend) => Ok(backend.as_ref()),
            Self::Unavailable(reason) => Err(Error::BackendUnavailable(reason.clone())),
        }
    }

    /// True if a backend is loaded.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Backend name, or `"unavailable"`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Available(backend) => backend.name(),
            Self::Unavailable(_) => "unavailable",
        }
    }
}

impl fmt::Debug for BackendCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(backend) => f.debug_tuple("Available").field(&backend.name()).finish(),
            Self::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

/// In-crate dense MLP backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend {
    _private: (),
}

impl NativeBackend {
    /// Create the backend.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl ModelBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn train(
        &self,
        spec: &ModelSpec,
        dataset: &Dataset,
        hyper: &Hyperparameters,
    ) -> Result<TrainedModel> {
        trainer::train(spec, dataset, hyper)
    }

    fn convert(&self, model: &TrainedModel, scheme: &QuantizationScheme) -> Result<Artifact> {
        let network = &model.network;
        let io = match scheme {
            QuantizationScheme::Int8 { calibration } => {
                Some(calibrate(network, calibration)?)
            }
            _ => None,
        };
        Artifact::encode(model.spec.task, network, scheme.mode(), io)
    }

    fn run(&self, artifact: &Artifact, input: &Tensor) -> Result<Tensor> {
        let meta = artifact.metadata();
        if input.dtype() != meta.input_dtype {
            return Err(Error::Validation(format!(
                "artifact expects {} input, got {}",
                meta.input_dtype.name(),
                input.dtype().name()
            )));
        }
        let expected = artifact.network().input_dim();
        if input.len() != expected {
            return Err(Error::Validation(format!(
                "expected {expected} input values, got {}",
                input.len()
            )));
        }

        match (input, artifact.int8_io()) {
            (Tensor::F32(x), None) => Ok(Tensor::F32(artifact.network().forward(x))),
            (Tensor::U8(q), Some(io)) => {
                let x = io.input.dequantize_slice(q);
                let y = artifact.network().forward(&x);
                Ok(Tensor::U8(io.output.quantize_slice(&y)))
            }
            _ => Err(Error::CorruptArtifact(
                "declared dtype disagrees with stored quantization params".to_string(),
            )),
        }
    }
}

/// Per-tensor affine params for the model's input and output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Int8Io {
    /// Input tensor params
    pub input: QuantParams,
    /// Output tensor params
    pub output: QuantParams,
    /// Number of calibration rows used
    pub calibration_samples: usize,
}

/// Derive int8 I/O params from calibration rows: input range from the rows
/// themselves, output range from the float model's outputs on those rows.
fn calibrate(network: &Network, calibration: &[Vec<f32>]) -> Result<Int8Io> {
    if calibration.is_empty() {
        return Err(Error::Validation(
            "int8 quantization requires calibration samples".to_string(),
        ));
    }
    let width = network.input_dim();
    if let Some(bad) = calibration.iter().find(|row| row.len() != width) {
        return Err(Error::Validation(format!(
            "calibration rows must have {width} values, found one with {}",
            bad.len()
        )));
    }
    if calibration.iter().flatten().any(|v| !v.is_finite()) {
        return Err(Error::Validation(
            "calibration samples contain non-finite values".to_string(),
        ));
    }

    let outputs: Vec<Vec<f32>> = calibration.iter().map(|row| network.forward(row)).collect();
    Ok(Int8Io {
        input: QuantParams::calibrate(calibration.iter().flatten()),
        output: QuantParams::calibrate(outputs.iter().flatten()),
        calibration_samples: calibration.len(),
    })
}
