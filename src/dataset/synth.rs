//! Seeded synthetic data generators
//!
//! Each generator draws its feature columns from independent uniform ranges,
//! derives a label from clipped linear terms plus Gaussian noise, and clamps
//! the label to its valid range. Columns are drawn one after another from a
//! single `StdRng`, so a `(task, seed, n)` triple always reproduces the same
//! bits.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Dataset, Labels};
use crate::task::Task;
use crate::{Error, Result};

/// Injury risk class thresholds (risk < 0.3 → low, < 0.6 → moderate).
pub const RISK_MODERATE_THRESHOLD: f64 = 0.3;
/// See [`RISK_MODERATE_THRESHOLD`].
pub const RISK_HIGH_THRESHOLD: f64 = 0.6;

/// Generate a dataset for `task` using its fixed seed.
///
/// # Errors
///
/// Returns `Error::Validation` if `n_samples` is zero.
pub fn synthesize(task: Task, n_samples: usize) -> Result<Dataset> {
    synthesize_with_seed(task, task.seed(), n_samples)
}

/// Generate a dataset for `task` with an explicit seed.
///
/// # Errors
///
/// Returns `Error::Validation` if `n_samples` is zero.
pub fn synthesize_with_seed(task: Task, seed: u64, n_samples: usize) -> Result<Dataset> {
    if n_samples == 0 {
        return Err(Error::Validation(
            "sample count must be positive".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let (columns, labels) = match task {
        Task::GaitForm => gait(&mut rng, n_samples),
        Task::InjuryRisk => injury(&mut rng, n_samples),
        Task::Performance => performance(&mut rng, n_samples),
    };

    Dataset::new(task, interleave(&columns, n_samples), labels)
}

fn gait(rng: &mut StdRng, n: usize) -> (Vec<Vec<f64>>, Labels) {
    let gct = uniform(rng, n, 180.0, 350.0);
    let osc = uniform(rng, n, 5.0, 15.0);
    let cadence = uniform(rng, n, 140.0, 200.0);
    let stride = uniform(rng, n, 0.7, 1.5);
    let lean = uniform(rng, n, 2.0, 15.0);
    let hip_drop = uniform(rng, n, 2.0, 12.0);
    let arm_sym = uniform(rng, n, 70.0, 100.0);
    let pace = uniform(rng, n, 3.5, 8.0);
    let noise = normal(rng, n, 3.0);

    let scores = (0..n)
        .map(|i| {
            let score = 30.0 * unit((cadence[i] - 140.0) / 60.0)
                + 20.0 * unit((300.0 - gct[i]) / 120.0)
                + 15.0 * unit((12.0 - osc[i]) / 7.0)
                + 10.0 * unit((10.0 - hip_drop[i]) / 8.0)
                + 10.0 * unit((arm_sym[i] - 70.0) / 30.0)
                + 10.0 * unit((10.0 - lean[i]) / 8.0)
                + 5.0 * unit((1.3 - stride[i]) / 0.6);
            (score + noise[i]).clamp(0.0, 100.0) as f32
        })
        .collect();

    (
        vec![gct, osc, cadence, stride, lean, hip_drop, arm_sym, pace],
        Labels::Regression(scores),
    )
}

fn injury(rng: &mut StdRng, n: usize) -> (Vec<Vec<f64>>, Labels) {
    let gct = uniform(rng, n, 180.0, 350.0);
    let osc = uniform(rng, n, 5.0, 15.0);
    let cadence = uniform(rng, n, 140.0, 200.0);
    let stride = uniform(rng, n, 0.7, 1.5);
    let hip_drop = uniform(rng, n, 2.0, 12.0);
    let weekly_km = uniform(rng, n, 5.0, 120.0);
    let acwr = uniform(rng, n, 0.5, 2.0);
    let noise = normal(rng, n, 0.05);

    let classes = (0..n)
        .map(|i| {
            let risk = 0.15 * unit((gct[i] - 250.0) / 100.0)
                + 0.15 * unit((osc[i] - 10.0) / 5.0)
                + 0.15 * unit((170.0 - cadence[i]) / 30.0)
                + 0.1 * unit((stride[i] - 1.1) / 0.4)
                + 0.15 * unit((hip_drop[i] - 6.0) / 6.0)
                + 0.1 * unit((weekly_km[i] - 60.0) / 60.0)
                + 0.2 * unit((acwr[i] - 1.3) / 0.7);
            risk_class((risk + noise[i]).clamp(0.0, 1.0))
        })
        .collect();

    (
        vec![gct, osc, cadence, stride, hip_drop, weekly_km, acwr],
        Labels::Classes(classes),
    )
}

fn performance(rng: &mut StdRng, n: usize) -> (Vec<Vec<f64>>, Labels) {
    let weekly_km = uniform(rng, n, 10.0, 100.0);
    let pace = uniform(rng, n, 3.5, 8.0);
    let runs_per_week = uniform(rng, n, 2.0, 7.0);
    let longest_run = uniform(rng, n, 3.0, 30.0);
    let rhr = uniform(rng, n, 40.0, 80.0);
    let hrv = uniform(rng, n, 20.0, 100.0);
    let noise = normal(rng, n, 30.0);

    let times = (0..n)
        .map(|i| {
            // race pace ~12% faster than training pace
            let base = pace[i] * 5.0 * 60.0 * 0.88;
            let volume = -unit((weekly_km[i] - 30.0) / 70.0) * 120.0;
            let fitness = -unit((70.0 - rhr[i]) / 30.0) * 90.0;
            let recovery = -unit((hrv[i] - 40.0) / 60.0) * 60.0;
            let consistency = -unit((runs_per_week[i] - 3.0) / 4.0) * 45.0;
            (base + volume + fitness + recovery + consistency + noise[i]).clamp(720.0, 2400.0)
                as f32
        })
        .collect();

    (
        vec![weekly_km, pace, runs_per_week, longest_run, rhr, hrv],
        Labels::Regression(times),
    )
}

/// Bin a continuous risk score into {0: low, 1: moderate, 2: high}.
#[must_use]
pub fn risk_class(risk: f64) -> u32 {
    if risk < RISK_MODERATE_THRESHOLD {
        0
    } else if risk < RISK_HIGH_THRESHOLD {
        1
    } else {
        2
    }
}

fn unit(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

fn uniform(rng: &mut StdRng, n: usize, low: f64, high: f64) -> Vec<f64> {
    (0..n).map(|_| rng.gen_range(low..high)).collect()
}

/// Zero-mean Gaussian samples via the Box-Muller transform.
fn normal(rng: &mut StdRng, n: usize, sigma: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(n + 1);
    while out.len() < n {
        // 1 - u keeps the log argument in (0, 1]
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = rng.gen::<f64>();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = std::f64::consts::TAU * u2;
        out.push(radius * theta.cos() * sigma);
        out.push(radius * theta.sin() * sigma);
    }
    out.truncate(n);
    out
}

/// Column-major f64 columns → row-major f32 matrix.
fn interleave(columns: &[Vec<f64>], n: usize) -> Vec<f32> {
    let mut rows = Vec::with_capacity(n * columns.len());
    for i in 0..n {
        rows.extend(columns.iter().map(|col| col[i] as f32));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_samples_rejected() {
        assert!(matches!(
            synthesize(Task::GaitForm, 0),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_risk_class_thresholds() {
        assert_eq!(risk_class(0.0), 0);
        assert_eq!(risk_class(0.299), 0);
        assert_eq!(risk_class(0.3), 1);
        assert_eq!(risk_class(0.599), 1);
        assert_eq!(risk_class(0.6), 2);
        assert_eq!(risk_class(1.0), 2);
    }

    #[test]
    fn test_gait_ranges() {
        let ds = synthesize(Task::GaitForm, 500).unwrap();
        assert_eq!(ds.len(), 500);
        assert_eq!(ds.n_features(), 8);
        for row in ds.rows() {
            assert!((180.0..=350.0).contains(&row[0]));
            assert!((140.0..=200.0).contains(&row[2]));
            assert!((3.5..=8.0).contains(&row[7]));
        }
        let Labels::Regression(scores) = ds.labels() else {
            panic!("gait labels must be regression targets");
        };
        assert!(scores.iter().all(|s| (0.0..=100.0).contains(s)));
    }

    #[test]
    fn test_performance_labels_clamped() {
        let ds = synthesize(Task::Performance, 1000).unwrap();
        let Labels::Regression(times) = ds.labels() else {
            panic!("performance labels must be regression targets");
        };
        assert!(times.iter().all(|t| (720.0..=2400.0).contains(t)));
    }

    #[test]
    fn test_injury_uses_all_classes() {
        let ds = synthesize(Task::InjuryRisk, 2000).unwrap();
        let Labels::Classes(classes) = ds.labels() else {
            panic!("injury labels must be classes");
        };
        for class in 0..3 {
            assert!(classes.contains(&class), "class {class} never generated");
        }
    }

    #[test]
    fn test_seed_changes_output() {
        let a = synthesize_with_seed(Task::Performance, 1, 50).unwrap();
        let b = synthesize_with_seed(Task::Performance, 2, 50).unwrap();
        assert_ne!(a.features(), b.features());
    }
}
