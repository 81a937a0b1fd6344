//! Binary artifact layout
//!
//! ```text
//! magic "APXM" | version u16 | task u8 | mode u8
//! input_dim u32 | output_dim u32 | input dtype u8 | output dtype u8
//! [int8 only] calibration_samples u32 | in_scale f32 | in_zp u8 | out_scale f32 | out_zp u8
//! input_mean f32×in | input_std f32×in | output_mean f32 | output_std f32
//! layer_count u16
//!   { in u32 | out u32 | activation u8 | weights tensor | bias tensor } × layer_count
//! content hash u64 (trueno::hash_bytes over everything above)
//! ```
//!
//! A stored tensor is `tag u8 | len u32 | [params] | data`. All integers are
//! little-endian.

use crate::backend::network::{Activation, Dense, Network};
use crate::backend::Int8Io;
use crate::quant::{self, DType, QuantParams, QuantizationMode};
use crate::task::Task;
use crate::{Error, Result};

/// File magic.
pub const MAGIC: &[u8; 4] = b"APXM";
/// Current format version.
pub const VERSION: u16 = 1;
const HASH_LEN: usize = 8;

const TAG_F32: u8 = 0;
const TAG_F16: u8 = 1;
const TAG_I8_SYMMETRIC: u8 = 2;
const TAG_U8_AFFINE: u8 = 3;

/// Fixed fields decoded ahead of the layers.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Header {
    pub task: Task,
    pub mode: QuantizationMode,
    pub input_dim: usize,
    pub output_dim: usize,
    pub input_dtype: DType,
    pub output_dtype: DType,
    pub int8: Option<Int8Io>,
}

/// Serialize `network` under `mode`, appending the content hash.
pub(crate) fn encode(
    task: Task,
    network: &Network,
    mode: QuantizationMode,
    int8: Option<Int8Io>,
) -> Result<Vec<u8>> {
    if (mode == QuantizationMode::Int8) != int8.is_some() {
        return Err(Error::Validation(format!(
            "{mode} export needs quantization params exactly when the mode is int8"
        )));
    }

    let mut w = Writer::default();
    w.bytes(MAGIC);
    w.u16(VERSION);
    w.u8(task.id());
    w.u8(mode.id());
    w.len(network.input_dim())?;
    w.len(network.output_dim())?;
    w.u8(dtype_id(mode.io_dtype()));
    w.u8(dtype_id(mode.io_dtype()));

    if let Some(io) = int8 {
        w.len(io.calibration_samples)?;
        w.f32(io.input.scale);
        w.u8(io.input.zero_point);
        w.f32(io.output.scale);
        w.u8(io.output.zero_point);
    }

    w.f32s(&network.input_mean);
    w.f32s(&network.input_std);
    w.f32(network.output_mean);
    w.f32(network.output_std);

    let count = u16::try_from(network.layers.len())
        .map_err(|_| Error::Validation("too many layers".to_string()))?;
    w.u16(count);
    for layer in &network.layers {
        w.len(layer.in_dim)?;
        w.len(layer.out_dim)?;
        w.u8(layer.activation.id());
        match mode {
            QuantizationMode::None => {
                w.tensor_f32(&layer.weights)?;
                w.tensor_f32(&layer.bias)?;
            }
            QuantizationMode::Float16 => {
                w.tensor_f16(&layer.weights)?;
                w.tensor_f16(&layer.bias)?;
            }
            QuantizationMode::Dynamic => {
                w.tensor_i8(&layer.weights)?;
                w.tensor_f32(&layer.bias)?;
            }
            QuantizationMode::Int8 => {
                w.tensor_u8(&layer.weights)?;
                w.tensor_f32(&layer.bias)?;
            }
        }
    }

    let mut bytes = w.buf;
    let hash = trueno::hash_bytes(&bytes);
    bytes.extend_from_slice(&hash.to_le_bytes());
    Ok(bytes)
}

/// Verify the content hash and decode header and network.
pub(crate) fn decode(bytes: &[u8]) -> Result<(Header, Network, u64)> {
    if bytes.len() < MAGIC.len() + HASH_LEN {
        return Err(corrupt(format!("{} bytes is too short", bytes.len())));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(corrupt("bad magic"));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - HASH_LEN);
    let mut stored = [0u8; HASH_LEN];
    stored.copy_from_slice(trailer);
    let stored = u64::from_le_bytes(stored);
    if trueno::hash_bytes(body) != stored {
        return Err(corrupt("content hash mismatch"));
    }

    let mut r = Reader::new(body);
    r.take(MAGIC.len())?;
    let version = r.u16()?;
    if version != VERSION {
        return Err(corrupt(format!("unsupported format version {version}")));
    }
    let task = Task::from_id(r.u8()?).ok_or_else(|| corrupt("unknown task id"))?;
    let mode = QuantizationMode::from_id(r.u8()?).ok_or_else(|| corrupt("unknown quantization mode"))?;
    let input_dim = r.len()?;
    let output_dim = r.len()?;
    let input_dtype = dtype_from_id(r.u8()?)?;
    let output_dtype = dtype_from_id(r.u8()?)?;
    if input_dtype != mode.io_dtype() || output_dtype != mode.io_dtype() {
        return Err(corrupt(format!("dtypes inconsistent with {mode} mode")));
    }
    if input_dim != task.input_dim() || output_dim != task.output_kind().width() {
        return Err(corrupt(format!("shape does not match the {task} contract")));
    }

    let int8 = if mode == QuantizationMode::Int8 {
        let calibration_samples = r.len()?;
        let input = QuantParams {
            scale: r.f32()?,
            zero_point: r.u8()?,
        };
        let output = QuantParams {
            scale: r.f32()?,
            zero_point: r.u8()?,
        };
        if !(input.scale > 0.0 && output.scale > 0.0) {
            return Err(corrupt("non-positive quantization scale"));
        }
        Some(Int8Io {
            input,
            output,
            calibration_samples,
        })
    } else {
        None
    };

    let input_mean = r.f32s(input_dim)?;
    let input_std = r.f32s(input_dim)?;
    let output_mean = r.f32()?;
    let output_std = r.f32()?;

    let count = usize::from(r.u16()?);
    let mut layers = Vec::with_capacity(count);
    let mut width = input_dim;
    for l in 0..count {
        let in_dim = r.len()?;
        let out_dim = r.len()?;
        let activation = Activation::from_id(r.u8()?).ok_or_else(|| corrupt("unknown activation"))?;
        if in_dim != width {
            return Err(corrupt(format!("layer {l} expects {in_dim} inputs, previous width {width}")));
        }
        let weights = r.tensor()?;
        let bias = r.tensor()?;
        if Some(weights.len()) != in_dim.checked_mul(out_dim) || bias.len() != out_dim {
            return Err(corrupt(format!("layer {l} tensor sizes do not match its shape")));
        }
        layers.push(Dense {
            in_dim,
            out_dim,
            weights,
            bias,
            activation,
        });
        width = out_dim;
    }
    if layers.is_empty() || width != output_dim {
        return Err(corrupt("layer chain does not end at the output width"));
    }
    if !r.is_done() {
        return Err(corrupt("trailing bytes before content hash"));
    }

    let header = Header {
        task,
        mode,
        input_dim,
        output_dim,
        input_dtype,
        output_dtype,
        int8,
    };
    let network = Network {
        input_mean,
        input_std,
        layers,
        output_mean,
        output_std,
    };
    Ok((header, network, stored))
}

fn corrupt(msg: impl Into<String>) -> Error {
    Error::CorruptArtifact(msg.into())
}

const fn dtype_id(dtype: DType) -> u8 {
    match dtype {
        DType::Float32 => 0,
        DType::Uint8 => 1,
    }
}

fn dtype_from_id(id: u8) -> Result<DType> {
    match id {
        0 => Ok(DType::Float32),
        1 => Ok(DType::Uint8),
        other => Err(corrupt(format!("unknown dtype {other}"))),
    }
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_le_bytes());
    }

    fn len(&mut self, v: usize) -> Result<()> {
        let v = u32::try_from(v)
            .map_err(|_| Error::Validation(format!("dimension {v} exceeds u32")))?;
        self.bytes(&v.to_le_bytes());
        Ok(())
    }

    fn f32(&mut self, v: f32) {
        self.bytes(&v.to_le_bytes());
    }

    fn f32s(&mut self, values: &[f32]) {
        values.iter().for_each(|&v| self.f32(v));
    }

    fn tensor_f32(&mut self, values: &[f32]) -> Result<()> {
        self.u8(TAG_F32);
        self.len(values.len())?;
        self.f32s(values);
        Ok(())
    }

    fn tensor_f16(&mut self, values: &[f32]) -> Result<()> {
        self.u8(TAG_F16);
        self.len(values.len())?;
        for bits in quant::to_f16_bits(values) {
            self.u16(bits);
        }
        Ok(())
    }

    fn tensor_i8(&mut self, values: &[f32]) -> Result<()> {
        let (scale, qs) = quant::quantize_symmetric(values);
        self.u8(TAG_I8_SYMMETRIC);
        self.len(values.len())?;
        self.f32(scale);
        self.buf.extend(qs.iter().map(|&q| q.to_le_bytes()[0]));
        Ok(())
    }

    fn tensor_u8(&mut self, values: &[f32]) -> Result<()> {
        let params = QuantParams::calibrate(values);
        self.u8(TAG_U8_AFFINE);
        self.len(values.len())?;
        self.f32(params.scale);
        self.u8(params.zero_point);
        self.bytes(&params.quantize_slice(values));
        Ok(())
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    const fn is_done(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| corrupt(format!("truncated at byte {}", self.pos)))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn len(&mut self) -> Result<usize> {
        Ok(u32::from_le_bytes(self.array()?) as usize)
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn f32s(&mut self, n: usize) -> Result<Vec<f32>> {
        let bytes = self.take(n.checked_mul(4).ok_or_else(|| corrupt("length overflow"))?)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Read one stored tensor and dequantize it to f32.
    fn tensor(&mut self) -> Result<Vec<f32>> {
        let tag = self.u8()?;
        let n = self.len()?;
        match tag {
            TAG_F32 => self.f32s(n),
            TAG_F16 => {
                let bytes = self.take(n.checked_mul(2).ok_or_else(|| corrupt("length overflow"))?)?;
                let bits: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                Ok(quant::from_f16_bits(&bits))
            }
            TAG_I8_SYMMETRIC => {
                let scale = self.f32()?;
                let qs: Vec<i8> = self
                    .take(n)?
                    .iter()
                    .map(|&b| i8::from_le_bytes([b]))
                    .collect();
                Ok(quant::dequantize_symmetric(scale, &qs))
            }
            TAG_U8_AFFINE => {
                let params = QuantParams {
                    scale: self.f32()?,
                    zero_point: self.u8()?,
                };
                Ok(params.dequantize_slice(self.take(n)?))
            }
            other => Err(corrupt(format!("unknown tensor tag {other}"))),
        }
    }
}
