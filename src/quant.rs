//! Quantization schemes and numeric mappings
//!
//! Four export modes are supported:
//!
//! | Mode      | Weights at rest        | Tensor I/O | Calibration |
//! |-----------|------------------------|------------|-------------|
//! | `none`    | f32                    | f32        | no          |
//! | `float16` | IEEE half              | f32        | no          |
//! | `dynamic` | symmetric int8         | f32        | no          |
//! | `int8`    | affine u8 per tensor   | u8         | yes         |
//!
//! The affine mapping is `real = scale * (q - zero_point)` with `q ∈ [0, 255]`.

use std::fmt;
use std::str::FromStr;

use half::f16;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum number of calibration rows drawn from the training set.
pub const MAX_CALIBRATION_ROWS: usize = 200;

/// Export quantization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantizationMode {
    /// Full precision
    None,
    /// Half-precision weights (default for production tasks)
    #[default]
    Float16,
    /// Int8 weights at rest, float compute
    Dynamic,
    /// Full integer I/O with calibrated affine params
    Int8,
}

impl QuantizationMode {
    /// All modes.
    pub const ALL: [Self; 4] = [Self::None, Self::Float16, Self::Dynamic, Self::Int8];

    /// Lowercase name used in metadata and config.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Float16 => "float16",
            Self::Dynamic => "dynamic",
            Self::Int8 => "int8",
        }
    }

    pub(crate) const fn id(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Float16 => 1,
            Self::Dynamic => 2,
            Self::Int8 => 3,
        }
    }

    pub(crate) const fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::None),
            1 => Some(Self::Float16),
            2 => Some(Self::Dynamic),
            3 => Some(Self::Int8),
            _ => None,
        }
    }

    /// Element type of the model's input/output tensors under this mode.
    #[must_use]
    pub const fn io_dtype(self) -> DType {
        match self {
            Self::Int8 => DType::Uint8,
            _ => DType::Float32,
        }
    }
}

impl fmt::Display for QuantizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QuantizationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.name() == s)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "unknown quantization '{s}' (expected none, float16, dynamic or int8)"
                ))
            })
    }
}

/// A mode plus the data it needs at conversion time.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantizationScheme {
    /// Full precision
    None,
    /// Half-precision weights
    Float16,
    /// Int8 weights, float compute
    Dynamic,
    /// Full integer; `calibration` holds representative input rows
    Int8 {
        /// Representative input rows (at most [`MAX_CALIBRATION_ROWS`])
        calibration: Vec<Vec<f32>>,
    },
}

impl QuantizationScheme {
    /// Mode tag of this scheme.
    #[must_use]
    pub const fn mode(&self) -> QuantizationMode {
        match self {
            Self::None => QuantizationMode::None,
            Self::Float16 => QuantizationMode::Float16,
            Self::Dynamic => QuantizationMode::Dynamic,
            Self::Int8 { .. } => QuantizationMode::Int8,
        }
    }

    /// Build a scheme for `mode`, taking calibration rows from `calibration`
    /// when the mode needs them. Rows beyond [`MAX_CALIBRATION_ROWS`] are dropped.
    #[must_use]
    pub fn for_mode(mode: QuantizationMode, mut calibration: Vec<Vec<f32>>) -> Self {
        match mode {
            QuantizationMode::None => Self::None,
            QuantizationMode::Float16 => Self::Float16,
            QuantizationMode::Dynamic => Self::Dynamic,
            QuantizationMode::Int8 => {
                calibration.truncate(MAX_CALIBRATION_ROWS);
                Self::Int8 { calibration }
            }
        }
    }
}

/// Tensor element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit float
    Float32,
    /// Affine-quantized unsigned byte
    Uint8,
}

impl DType {
    /// Name as reported in artifact metadata.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Uint8 => "uint8",
        }
    }
}

/// Per-tensor affine mapping `real = scale * (q - zero_point)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantParams {
    /// Step size between adjacent quantized values
    pub scale: f32,
    /// Quantized value representing real zero
    pub zero_point: u8,
}

impl QuantParams {
    /// Derive params covering `[min, max]`, widened to include zero so that
    /// zero is exactly representable.
    #[must_use]
    pub fn from_range(min: f32, max: f32) -> Self {
        let min = min.min(0.0);
        let max = max.max(0.0);
        let range = max - min;
        if range <= f32::EPSILON || !range.is_finite() {
            return Self {
                scale: 1.0,
                zero_point: 0,
            };
        }
        let scale = range / 255.0;
        let zero_point = (-min / scale).round().clamp(0.0, 255.0) as u8;
        Self { scale, zero_point }
    }

    /// Derive params from every value in `values`.
    #[must_use]
    pub fn calibrate<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a f32>,
    {
        let (min, max) = values
            .into_iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if min > max {
            return Self::from_range(0.0, 0.0);
        }
        Self::from_range(min, max)
    }

    /// `q = round(real / scale + zero_point)`, saturated to `[0, 255]`.
    #[must_use]
    pub fn quantize(self, real: f32) -> u8 {
        (real / self.scale + f32::from(self.zero_point))
            .round()
            .clamp(0.0, 255.0) as u8
    }

    /// `real = (q - zero_point) * scale`.
    #[must_use]
    pub fn dequantize(self, q: u8) -> f32 {
        (f32::from(q) - f32::from(self.zero_point)) * self.scale
    }

    /// Quantize a slice.
    #[must_use]
    pub fn quantize_slice(self, reals: &[f32]) -> Vec<u8> {
        reals.iter().map(|&x| self.quantize(x)).collect()
    }

    /// Dequantize a slice.
    #[must_use]
    pub fn dequantize_slice(self, qs: &[u8]) -> Vec<f32> {
        qs.iter().map(|&q| self.dequantize(q)).collect()
    }
}

/// Symmetric int8 encoding used by `dynamic` weights: `real = scale * q`.
#[must_use]
pub fn quantize_symmetric(values: &[f32]) -> (f32, Vec<i8>) {
    let max_abs = values.iter().fold(0.0_f32, |acc, v| acc.max(v.abs()));
    let scale = if max_abs > 0.0 { max_abs / 127.0 } else { 1.0 };
    let qs = values
        .iter()
        .map(|&v| (v / scale).round().clamp(-127.0, 127.0) as i8)
        .collect();
    (scale, qs)
}

/// Inverse of [`quantize_symmetric`].
#[must_use]
pub fn dequantize_symmetric(scale: f32, qs: &[i8]) -> Vec<f32> {
    qs.iter().map(|&q| f32::from(q) * scale).collect()
}

/// Round-trip through IEEE half precision, as stored by `float16` artifacts.
#[must_use]
pub fn to_f16_bits(values: &[f32]) -> Vec<u16> {
    values.iter().map(|&v| f16::from_f32(v).to_bits()).collect()
}

/// Inverse of [`to_f16_bits`].
#[must_use]
pub fn from_f16_bits(bits: &[u16]) -> Vec<f32> {
    bits.iter().map(|&b| f16::from_bits(b).to_f32()).collect()
}
