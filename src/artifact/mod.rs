//! Quantized model artifacts
//!
//! An [`Artifact`] is the immutable, self-describing export of one trained
//! model: the encoded bytes exactly as stored on disk, the metadata derived
//! from them, and the dequantized network used for server-side execution.
//! Metadata is never stored separately; it is recomputed from the bytes, so
//! it cannot drift from the artifact it describes.

mod codec;

use serde::{Deserialize, Serialize};

use crate::backend::{Int8Io, Network};
use crate::quant::{DType, QuantParams, QuantizationMode};
use crate::task::Task;
use crate::Result;

pub use codec::{MAGIC, VERSION};

/// Metadata record reported by builds and the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Task the model was trained for
    pub task: Task,
    /// Stored filename
    pub filename: String,
    /// Exact byte size
    pub size_bytes: u64,
    /// Size in KiB, rounded to one decimal
    pub size_kb: f64,
    /// Quantization mode
    pub quantization: QuantizationMode,
    /// `[1, input_dim]`
    pub input_shape: [usize; 2],
    /// Input element type
    pub input_dtype: DType,
    /// `[1, output_dim]`
    pub output_shape: [usize; 2],
    /// Output element type
    pub output_dtype: DType,
    /// Input affine params (uint8 input only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_quantization: Option<QuantParams>,
    /// Output affine params (uint8 output only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_quantization: Option<QuantParams>,
    /// Calibration rows used for int8 conversion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration_samples: Option<usize>,
    /// Hex content hash (trailer of the binary)
    pub content_hash: String,
}

/// Round a byte count to KiB with one decimal.
#[must_use]
pub fn size_kb(size_bytes: u64) -> f64 {
    (size_bytes as f64 / 1024.0 * 10.0).round() / 10.0
}

/// Encoded model plus derived metadata.
#[derive(Debug, Clone)]
pub struct Artifact {
    bytes: Vec<u8>,
    metadata: ArtifactMetadata,
    network: Network,
    int8: Option<Int8Io>,
}

impl Artifact {
    /// Encode `network` for `task` under `mode`. `int8` must be present
    /// exactly when `mode` is [`QuantizationMode::Int8`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the params do not match the mode.
    pub fn encode(
        task: Task,
        network: &Network,
        mode: QuantizationMode,
        int8: Option<Int8Io>,
    ) -> Result<Self> {
        let bytes = codec::encode(task, network, mode, int8)?;
        Self::from_bytes(bytes)
    }

    /// Decode stored bytes, verifying the content hash.
    ///
    /// # Errors
    ///
    /// Returns `Error::CorruptArtifact` on any truncation, bit-flip or
    /// structural inconsistency.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let (header, network, hash) = codec::decode(&bytes)?;
        let size_bytes = bytes.len() as u64;
        let metadata = ArtifactMetadata {
            task: header.task,
            filename: header.task.artifact_filename(),
            size_bytes,
            size_kb: size_kb(size_bytes),
            quantization: header.mode,
            input_shape: [1, header.input_dim],
            input_dtype: header.input_dtype,
            output_shape: [1, header.output_dim],
            output_dtype: header.output_dtype,
            input_quantization: header.int8.map(|io| io.input),
            output_quantization: header.int8.map(|io| io.output),
            calibration_samples: header.int8.map(|io| io.calibration_samples),
            content_hash: format!("{hash:016x}"),
        };
        Ok(Self {
            bytes,
            metadata,
            network,
            int8: header.int8,
        })
    }

    /// Encoded bytes, exactly as stored.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Derived metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    /// Task the model was trained for.
    #[must_use]
    pub const fn task(&self) -> Task {
        self.metadata.task
    }

    /// Dequantized network for execution.
    #[must_use]
    pub const fn network(&self) -> &Network {
        &self.network
    }

    /// Input/output affine params of an int8 artifact.
    #[must_use]
    pub const fn int8_io(&self) -> Option<Int8Io> {
        self.int8
    }
}
