//! Bounded training loop
//!
//! Holds out the last `validation_fraction` of the samples, shuffles the rest
//! every epoch, and monitors validation loss:
//!
//! - no improvement for `lr_patience` epochs → learning rate × `lr_factor`
//!   (floored at `min_lr`)
//! - no improvement for `early_stop_patience` epochs → stop
//!
//! Whatever ends training (patience, epoch cap, wall clock), the returned
//! network is the one with the lowest validation loss seen.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::network::{Activation, Adam, Dense, Gradients, Network, Target};
use crate::dataset::{Dataset, Labels};
use crate::normalization::population_mean_std;
use crate::task::{ModelSpec, OutputKind};
use crate::{Error, Result};

/// Training hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Epoch cap
    pub epochs: usize,
    /// Mini-batch size
    pub batch_size: usize,
    /// Fraction of samples held out (taken from the end)
    pub validation_fraction: f32,
    /// Epochs without improvement before stopping
    pub early_stop_patience: usize,
    /// Epochs without improvement before decaying the learning rate
    pub lr_patience: usize,
    /// Learning-rate decay factor
    pub lr_factor: f32,
    /// Learning-rate floor
    pub min_lr: f32,
    /// Wall-clock ceiling for one training run
    pub max_duration: Option<Duration>,
    /// Seed for initialisation, shuffling and dropout
    pub seed: u64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            validation_fraction: 0.2,
            early_stop_patience: 10,
            lr_patience: 5,
            lr_factor: 0.5,
            min_lr: 1e-6,
            max_duration: Some(Duration::from_secs(600)),
            seed: 7,
        }
    }
}

/// Why training ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Ran every epoch
    EpochCap,
    /// Validation loss stopped improving
    EarlyStopping,
    /// Wall-clock ceiling hit
    TimeLimit,
}

/// Statistics for one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number
    pub epoch: usize,
    /// Mean training loss (with dropout)
    pub train_loss: f32,
    /// Mean validation loss (monitored)
    pub val_loss: f32,
    /// Informational validation metric (MAE in label units, or accuracy)
    pub val_metric: f32,
    /// Learning rate used during the epoch
    pub learning_rate: f32,
}

/// Summary of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Per-epoch history
    pub history: Vec<EpochStats>,
    /// Epoch whose weights were restored
    pub best_epoch: usize,
    /// Validation loss of the restored weights
    pub best_val_loss: f32,
    /// Name of `val_metric` ("mae" or "accuracy")
    pub metric: String,
    /// Why training ended
    pub stop_reason: StopReason,
    /// Training samples / validation samples
    pub train_samples: usize,
    /// See `train_samples`
    pub val_samples: usize,
    /// Wall-clock duration
    pub duration_ms: u64,
}

impl TrainingReport {
    /// True if training ended on patience.
    #[must_use]
    pub fn early_stopped(&self) -> bool {
        self.stop_reason == StopReason::EarlyStopping
    }

    /// Number of epochs actually run.
    #[must_use]
    pub fn epochs_completed(&self) -> usize {
        self.history.len()
    }
}

/// Trained weights plus the run that produced them.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    /// Architecture
    pub spec: ModelSpec,
    /// Restored (best) network
    pub network: Network,
    /// Training summary
    pub report: TrainingReport,
}

struct Split<'a> {
    dataset: &'a Dataset,
    train: Vec<usize>,
    val: Vec<usize>,
    target_mean: f32,
    target_std: f32,
}

impl Split<'_> {
    fn target(&self, i: usize) -> Target {
        match self.dataset.labels() {
            Labels::Regression(y) => Target::Value((y[i] - self.target_mean) / self.target_std),
            Labels::Classes(c) => Target::Class(c[i] as usize),
        }
    }
}

/// Train `spec` on `dataset`.
///
/// # Errors
///
/// - `Error::Validation` if the dataset does not match the model spec or is too
///   small to split
/// - `Error::TrainingFailure` if the loss becomes non-finite
pub fn train(spec: &ModelSpec, dataset: &Dataset, hyper: &Hyperparameters) -> Result<TrainedModel> {
    validate(spec, dataset, hyper)?;
    let started = Instant::now();
    let task = spec.task;

    let split = split(dataset, hyper.validation_fraction)?;
    let mut rng = StdRng::seed_from_u64(hyper.seed);
    let mut network = init_network(spec, &split, &mut rng);
    let mut adam = Adam::new(&network);

    info!(
        task = %task,
        train = split.train.len(),
        val = split.val.len(),
        params = network.parameter_count(),
        "Training started"
    );

    let mut lr = spec.learning_rate;
    let mut best = (f32::INFINITY, 0usize, network.clone());
    let mut wait = 0usize;
    let mut lr_wait = 0usize;
    let mut history = Vec::with_capacity(hyper.epochs);
    let mut stop_reason = StopReason::EpochCap;
    let mut order = split.train.clone();

    for epoch in 1..=hyper.epochs {
        order.shuffle(&mut rng);
        let mut loss_sum = 0.0f64;

        for (step, batch) in order.chunks(hyper.batch_size).enumerate() {
            let (grads, batch_loss) =
                batch_gradients(&network, &split, batch, spec, mix(hyper.seed, epoch, step));
            loss_sum += f64::from(batch_loss);
            adam.step(&mut network, &grads, lr);
        }

        let train_loss = (loss_sum / split.train.len() as f64) as f32;
        let (val_loss, val_metric) = evaluate(&network, &split);
        if !train_loss.is_finite() || !val_loss.is_finite() {
            return Err(Error::training(
                task.name(),
                format!("loss diverged at epoch {epoch} (train={train_loss}, val={val_loss})"),
            ));
        }

        debug!(
            task = %task,
            epoch,
            train_loss,
            val_loss,
            val_metric,
            lr,
            "Epoch complete"
        );
        history.push(EpochStats {
            epoch,
            train_loss,
            val_loss,
            val_metric,
            learning_rate: lr,
        });

        if val_loss < best.0 {
            best = (val_loss, epoch, network.clone());
            wait = 0;
            lr_wait = 0;
        } else {
            wait += 1;
            lr_wait += 1;
            if lr_wait >= hyper.lr_patience {
                let reduced = (lr * hyper.lr_factor).max(hyper.min_lr);
                if reduced < lr {
                    debug!(task = %task, epoch, from = lr, to = reduced, "Reducing learning rate");
                    lr = reduced;
                }
                lr_wait = 0;
            }
            if wait >= hyper.early_stop_patience {
                stop_reason = StopReason::EarlyStopping;
                break;
            }
        }

        if hyper
            .max_duration
            .is_some_and(|limit| started.elapsed() >= limit)
        {
            stop_reason = StopReason::TimeLimit;
            break;
        }
    }

    let (best_val_loss, best_epoch, best_network) = best;
    let report = TrainingReport {
        history,
        best_epoch,
        best_val_loss,
        metric: metric_name(spec.output).to_string(),
        stop_reason,
        train_samples: split.train.len(),
        val_samples: split.val.len(),
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };

    info!(
        task = %task,
        epochs = report.epochs_completed(),
        best_epoch,
        best_val_loss,
        stop = ?stop_reason,
        "Training finished, restored best weights"
    );

    Ok(TrainedModel {
        spec: spec.clone(),
        network: best_network,
        report,
    })
}

/// Validation loss and metric of `network` on the held-out samples of
/// `dataset`, using the same split as [`train`].
///
/// # Errors
///
/// Returns `Error::Validation` if the dataset is too small to split.
pub fn validation_loss(network: &Network, dataset: &Dataset, validation_fraction: f32) -> Result<f32> {
    let mut split = split(dataset, validation_fraction)?;
    split.target_mean = network.output_mean;
    split.target_std = network.output_std;
    Ok(evaluate(network, &split).0)
}

fn validate(spec: &ModelSpec, dataset: &Dataset, hyper: &Hyperparameters) -> Result<()> {
    if dataset.task() != spec.task || dataset.n_features() != spec.input_dim {
        return Err(Error::Validation(format!(
            "dataset for {} does not match model spec for {}",
            dataset.task(),
            spec.task
        )));
    }
    if spec.hidden.len() != spec.dropout.len() {
        return Err(Error::Validation(
            "one dropout rate per hidden layer required".to_string(),
        ));
    }
    if hyper.batch_size == 0 || hyper.epochs == 0 {
        return Err(Error::Validation(
            "batch size and epoch cap must be positive".to_string(),
        ));
    }
    if !(0.0..1.0).contains(&hyper.validation_fraction) {
        return Err(Error::Validation(
            "validation fraction must be in [0, 1)".to_string(),
        ));
    }
    Ok(())
}

fn split(dataset: &Dataset, validation_fraction: f32) -> Result<Split<'_>> {
    let n = dataset.len();
    let val_n = ((n as f32 * validation_fraction).round() as usize).max(1);
    if val_n >= n {
        return Err(Error::Validation(format!(
            "{n} samples cannot be split into training and validation sets"
        )));
    }
    let train: Vec<usize> = (0..n - val_n).collect();
    let val: Vec<usize> = (n - val_n..n).collect();

    let (target_mean, target_std) = match dataset.labels() {
        Labels::Regression(y) => {
            let values: Vec<f32> = train.iter().map(|&i| y[i]).collect();
            mean_std(&values)
        }
        Labels::Classes(_) => (0.0, 1.0),
    };

    Ok(Split {
        dataset,
        train,
        val,
        target_mean,
        target_std,
    })
}

fn init_network(spec: &ModelSpec, split: &Split<'_>, rng: &mut StdRng) -> Network {
    let f = spec.input_dim;
    let (input_mean, input_std): (Vec<f32>, Vec<f32>) = (0..f)
        .map(|j| {
            let column: Vec<f32> = split
                .train
                .iter()
                .map(|&i| split.dataset.row(i)[j])
                .collect();
            mean_std(&column)
        })
        .unzip();

    let mut layers = Vec::with_capacity(spec.hidden.len() + 1);
    let mut width = f;
    for &hidden in &spec.hidden {
        layers.push(Dense::glorot(width, hidden, Activation::Relu, rng));
        width = hidden;
    }
    let head = match spec.output {
        OutputKind::Regression => Activation::Linear,
        OutputKind::Classification { .. } => Activation::Softmax,
    };
    layers.push(Dense::glorot(width, spec.output.width(), head, rng));

    Network {
        input_mean,
        input_std,
        layers,
        output_mean: split.target_mean,
        output_std: split.target_std,
    }
}

/// Mean gradient of a mini-batch. Per-sample gradients run on the rayon pool
/// and are summed in sample order, so results do not depend on scheduling.
fn batch_gradients(
    network: &Network,
    split: &Split<'_>,
    batch: &[usize],
    spec: &ModelSpec,
    batch_seed: u64,
) -> (Gradients, f32) {
    let per_sample: Vec<(Gradients, f32)> = batch
        .par_iter()
        .enumerate()
        .map(|(k, &i)| {
            let mut rng = StdRng::seed_from_u64(batch_seed ^ (k as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
            network.backprop(split.dataset.row(i), split.target(i), &spec.dropout, &mut rng)
        })
        .collect();

    let mut total = Gradients::zeros(network);
    let mut loss = 0.0;
    for (grads, sample_loss) in &per_sample {
        total.accumulate(grads);
        loss += sample_loss;
    }
    total.scale(1.0 / batch.len() as f32);
    (total, loss)
}

/// Mean validation loss and metric.
fn evaluate(network: &Network, split: &Split<'_>) -> (f32, f32) {
    let mut loss = 0.0f64;
    let mut metric = 0.0f64;
    for &i in &split.val {
        let output = network.forward_standardized(split.dataset.row(i));
        let target = split.target(i);
        loss += f64::from(Network::loss(&output, target));
        metric += match target {
            Target::Value(t) => f64::from(((output[0] - t) * split.target_std).abs()),
            Target::Class(c) => {
                let predicted = argmax(&output);
                if predicted == c {
                    1.0
                } else {
                    0.0
                }
            }
        };
    }
    let n = split.val.len() as f64;
    ((loss / n) as f32, (metric / n) as f32)
}

const fn metric_name(output: OutputKind) -> &'static str {
    match output {
        OutputKind::Regression => "mae",
        OutputKind::Classification { .. } => "accuracy",
    }
}

pub(crate) fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}

/// Population mean and std for standardization; a zero std is replaced by 1.
fn mean_std(values: &[f32]) -> (f32, f32) {
    let (mean, std) = population_mean_std(values);
    (mean, if std > 1e-12 { std } else { 1.0 })
}

/// Derive a per-batch seed from the run seed and position.
fn mix(seed: u64, epoch: usize, step: usize) -> u64 {
    let mut z = seed
        .wrapping_add((epoch as u64) << 32)
        .wrapping_add(step as u64)
        .wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
