//! Dense MLP used by the native backend
//!
//! Layout of a network:
//!
//! ```text
//! x ─► standardize(mean, std) ─► Dense+ReLU ─► … ─► Dense(+Softmax) ─► de-standardize ─► y
//! ```
//!
//! Standardization is fixed (computed from the training split) and is part of
//! the exported artifact, so callers feed raw features. De-standardization
//! only applies to regression outputs.

use rand::rngs::StdRng;
use rand::Rng;
use trueno::Vector;

/// Layer activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Identity
    Linear,
    /// max(0, x)
    Relu,
    /// Normalized exponential over the whole layer
    Softmax,
}

impl Activation {
    pub(crate) const fn id(self) -> u8 {
        match self {
            Self::Linear => 0,
            Self::Relu => 1,
            Self::Softmax => 2,
        }
    }

    pub(crate) const fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Linear),
            1 => Some(Self::Relu),
            2 => Some(Self::Softmax),
            _ => None,
        }
    }
}

/// Fully connected layer; `weights` is `out_dim × in_dim`, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    pub(crate) in_dim: usize,
    pub(crate) out_dim: usize,
    pub(crate) weights: Vec<f32>,
    pub(crate) bias: Vec<f32>,
    pub(crate) activation: Activation,
}

impl Dense {
    /// Glorot-uniform initialised layer with zero bias.
    pub(crate) fn glorot(in_dim: usize, out_dim: usize, activation: Activation, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (in_dim + out_dim) as f32).sqrt();
        let weights = (0..in_dim * out_dim)
            .map(|_| rng.gen_range(-limit..limit))
            .collect();
        Self {
            in_dim,
            out_dim,
            weights,
            bias: vec![0.0; out_dim],
            activation,
        }
    }

    fn row(&self, o: usize) -> &[f32] {
        &self.weights[o * self.in_dim..(o + 1) * self.in_dim]
    }

    /// Pre-activation `W·x + b`.
    fn linear(&self, x: &[f32]) -> Vec<f32> {
        let xv = Vector::from_slice(x);
        (0..self.out_dim)
            .map(|o| dot(self.row(o), x, &xv) + self.bias[o])
            .collect()
    }

    fn forward(&self, x: &[f32]) -> Vec<f32> {
        let mut z = self.linear(x);
        activate(self.activation, &mut z);
        z
    }
}

/// SIMD dot product of a weight row with an input already loaded into `xv`.
fn dot(row: &[f32], x: &[f32], xv: &Vector<f32>) -> f32 {
    Vector::from_slice(row)
        .dot(xv)
        .unwrap_or_else(|_| row.iter().zip(x).map(|(w, v)| w * v).sum())
}

fn activate(activation: Activation, z: &mut [f32]) {
    match activation {
        Activation::Linear => {}
        Activation::Relu => z.iter_mut().for_each(|v| *v = v.max(0.0)),
        Activation::Softmax => {
            let max = z.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut total = 0.0;
            for v in z.iter_mut() {
                *v = (*v - max).exp();
                total += *v;
            }
            z.iter_mut().for_each(|v| *v /= total);
        }
    }
}

/// Supervision target for one sample.
#[derive(Debug, Clone, Copy)]
pub enum Target {
    /// Standardized regression target
    Value(f32),
    /// Class index
    Class(usize),
}

/// Per-layer gradient buffers, same shapes as the layers.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub(crate) layers: Vec<(Vec<f32>, Vec<f32>)>,
}

impl Gradients {
    pub(crate) fn zeros(network: &Network) -> Self {
        Self {
            layers: network
                .layers
                .iter()
                .map(|l| (vec![0.0; l.weights.len()], vec![0.0; l.bias.len()]))
                .collect(),
        }
    }

    pub(crate) fn accumulate(&mut self, other: &Self) {
        for ((w, b), (ow, ob)) in self.layers.iter_mut().zip(&other.layers) {
            w.iter_mut().zip(ow).for_each(|(a, g)| *a += g);
            b.iter_mut().zip(ob).for_each(|(a, g)| *a += g);
        }
    }

    pub(crate) fn scale(&mut self, factor: f32) {
        for (w, b) in &mut self.layers {
            w.iter_mut().for_each(|g| *g *= factor);
            b.iter_mut().for_each(|g| *g *= factor);
        }
    }
}

/// Standardizing MLP.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    pub(crate) input_mean: Vec<f32>,
    pub(crate) input_std: Vec<f32>,
    pub(crate) layers: Vec<Dense>,
    /// Regression de-standardization `(mean, std)`; `(0, 1)` for classifiers
    pub(crate) output_mean: f32,
    pub(crate) output_std: f32,
}

impl Network {
    /// Input width.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.input_mean.len()
    }

    /// Output width.
    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.layers.last().map_or(0, |l| l.out_dim)
    }

    /// Number of trainable parameters.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weights.len() + l.bias.len())
            .sum()
    }

    fn standardize(&self, x: &[f32]) -> Vec<f32> {
        x.iter()
            .zip(self.input_mean.iter().zip(&self.input_std))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    /// Inference-mode forward pass on raw features.
    #[must_use]
    pub fn forward(&self, x: &[f32]) -> Vec<f32> {
        let mut a = self.standardize(x);
        for layer in &self.layers {
            a = layer.forward(&a);
        }
        if self.is_regression() {
            a.iter_mut()
                .for_each(|v| *v = *v * self.output_std + self.output_mean);
        }
        a
    }

    /// Forward pass without output de-standardization (training space).
    pub(crate) fn forward_standardized(&self, x: &[f32]) -> Vec<f32> {
        let mut a = self.standardize(x);
        for layer in &self.layers {
            a = layer.forward(&a);
        }
        a
    }

    pub(crate) fn is_regression(&self) -> bool {
        self.layers
            .last()
            .map_or(true, |l| l.activation != Activation::Softmax)
    }

    /// Loss of one sample in training space (MSE or cross-entropy).
    pub(crate) fn loss(output: &[f32], target: Target) -> f32 {
        match target {
            Target::Value(t) => {
                let d = output[0] - t;
                d * d
            }
            Target::Class(c) => -output[c].max(1e-7).ln(),
        }
    }

    /// Gradients of the loss for a single sample, with inverted dropout
    /// applied after each hidden layer.
    pub(crate) fn backprop(
        &self,
        x: &[f32],
        target: Target,
        dropout: &[f32],
        rng: &mut StdRng,
    ) -> (Gradients, f32) {
        let depth = self.layers.len();
        // activations[0] is the standardized input, activations[l + 1] is layer l's output
        let mut activations = Vec::with_capacity(depth + 1);
        let mut masks: Vec<Vec<f32>> = Vec::with_capacity(depth);
        activations.push(self.standardize(x));

        for (l, layer) in self.layers.iter().enumerate() {
            let mut a = layer.forward(&activations[l]);
            let rate = dropout.get(l).copied().unwrap_or(0.0);
            let mask: Vec<f32> = if l + 1 < depth && rate > 0.0 {
                let keep = 1.0 - rate;
                (0..a.len())
                    .map(|_| if rng.gen::<f32>() < keep { 1.0 / keep } else { 0.0 })
                    .collect()
            } else {
                vec![1.0; a.len()]
            };
            a.iter_mut().zip(&mask).for_each(|(v, m)| *v *= m);
            masks.push(mask);
            activations.push(a);
        }

        let output = &activations[depth];
        let loss = Self::loss(output, target);

        // dL/dz of the output layer (MSE: 2(y - t); softmax + CE: p - onehot)
        let mut delta: Vec<f32> = match target {
            Target::Value(t) => vec![2.0 * (output[0] - t)],
            Target::Class(c) => output
                .iter()
                .enumerate()
                .map(|(k, p)| if k == c { p - 1.0 } else { *p })
                .collect(),
        };

        let mut grads = Gradients::zeros(self);
        for l in (0..depth).rev() {
            let layer = &self.layers[l];
            let input = &activations[l];
            let (gw, gb) = &mut grads.layers[l];
            for o in 0..layer.out_dim {
                let d = delta[o];
                gb[o] = d;
                let row = &mut gw[o * layer.in_dim..(o + 1) * layer.in_dim];
                row.iter_mut().zip(input).for_each(|(g, a)| *g = d * a);
            }
            if l == 0 {
                break;
            }
            // propagate through W^T, then the previous layer's dropout and ReLU
            let prev_mask = &masks[l - 1];
            let prev_out = input;
            delta = (0..layer.in_dim)
                .map(|i| {
                    if prev_out[i] <= 0.0 {
                        return 0.0;
                    }
                    let back: f32 = (0..layer.out_dim)
                        .map(|o| layer.weights[o * layer.in_dim + i] * delta[o])
                        .sum();
                    back * prev_mask[i]
                })
                .collect();
        }

        (grads, loss)
    }
}

/// Adam optimizer state.
#[derive(Debug, Clone)]
pub struct Adam {
    m: Gradients,
    v: Gradients,
    step: i32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
}

impl Adam {
    /// Fresh optimizer state for `network`.
    #[must_use]
    pub fn new(network: &Network) -> Self {
        Self {
            m: Gradients::zeros(network),
            v: Gradients::zeros(network),
            step: 0,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }

    /// Apply one update with learning rate `lr`.
    pub fn step(&mut self, network: &mut Network, grads: &Gradients, lr: f32) {
        self.step += 1;
        let bias1 = 1.0 - self.beta1.powi(self.step);
        let bias2 = 1.0 - self.beta2.powi(self.step);
        let lr_t = lr * bias2.sqrt() / bias1;
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);

        for (l, layer) in network.layers.iter_mut().enumerate() {
            let (gw, gb) = &grads.layers[l];
            let (mw, mb) = &mut self.m.layers[l];
            let (vw, vb) = &mut self.v.layers[l];
            for (param, g, m, v) in [
                (&mut layer.weights, gw, mw, vw),
                (&mut layer.bias, gb, mb, vb),
            ] {
                for i in 0..param.len() {
                    m[i] = b1 * m[i] + (1.0 - b1) * g[i];
                    v[i] = b2 * v[i] + (1.0 - b2) * g[i] * g[i];
                    param[i] -= lr_t * m[i] / (v[i].sqrt() + eps);
                }
            }
        }
    }
}
