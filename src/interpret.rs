//! Interpretation of raw model outputs
//!
//! Pure functions from an output vector to a task-specific result. No I/O,
//! no randomness.

use serde::{Deserialize, Serialize};

use crate::task::Task;
use crate::{Error, Result};

/// Floor applied to predicted 5K times (12:00).
pub const MIN_5K_SECONDS: f32 = 720.0;

/// Riegel exponent.
pub const RIEGEL_EXPONENT: f64 = 1.06;

/// Half marathon distance in km.
pub const HALF_MARATHON_KM: f64 = 21.0975;

/// Marathon distance in km.
pub const MARATHON_KM: f64 = 42.195;

/// Form level buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormLevel {
    /// ≥ 80
    Excellent,
    /// ≥ 60
    Good,
    /// ≥ 40
    NeedsWork,
    /// < 40
    Poor,
}

impl FormLevel {
    /// Bucket a clamped form score.
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        if score >= 80.0 {
            Self::Excellent
        } else if score >= 60.0 {
            Self::Good
        } else if score >= 40.0 {
            Self::NeedsWork
        } else {
            Self::Poor
        }
    }
}

/// Injury risk classes, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Class 0
    Low,
    /// Class 1
    Moderate,
    /// Class 2
    High,
}

impl RiskLevel {
    const ALL: [Self; 3] = [Self::Low, Self::Moderate, Self::High];
}

/// Per-class probabilities in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskProbabilities {
    /// P(low) × 100
    pub low: f32,
    /// P(moderate) × 100
    pub moderate: f32,
    /// P(high) × 100
    pub high: f32,
}

/// Structured result of one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Interpretation {
    /// gait_form
    GaitForm {
        /// Score clamped to [0, 100]
        form_score: f32,
        /// Score bucket
        level: FormLevel,
    },
    /// injury_risk
    InjuryRisk {
        /// Most probable class
        risk_level: RiskLevel,
        /// Probability of that class × 100
        confidence: f32,
        /// All class probabilities × 100
        probabilities: RiskProbabilities,
    },
    /// performance
    Performance {
        /// 5K time (floored at 720 s)
        predicted_5k_seconds: u32,
        /// 5K time as `m:ss`
        predicted_5k_formatted: String,
        /// Riegel 10K
        predicted_10k_seconds: u32,
        /// Riegel half marathon
        predicted_half_marathon_seconds: u32,
        /// Riegel marathon
        predicted_marathon_seconds: u32,
    },
}

/// Interpret `output` for `task`.
///
/// # Errors
///
/// Returns `Error::Validation` if the output width does not match the task.
pub fn interpret(task: Task, output: &[f32]) -> Result<Interpretation> {
    let expected = task.output_kind().width();
    if output.len() != expected {
        return Err(Error::Validation(format!(
            "{task} produces {expected} outputs, got {}",
            output.len()
        )));
    }
    Ok(match task {
        Task::GaitForm => gait_form(output[0]),
        Task::InjuryRisk => injury_risk([output[0], output[1], output[2]]),
        Task::Performance => performance(output[0]),
    })
}

/// Form score result.
#[must_use]
pub fn gait_form(raw: f32) -> Interpretation {
    let form_score = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 100.0) };
    Interpretation::GaitForm {
        form_score,
        level: FormLevel::from_score(form_score),
    }
}

/// Injury risk result from class probabilities.
#[must_use]
pub fn injury_risk(probs: [f32; 3]) -> Interpretation {
    let (class, p) = probs
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });
    Interpretation::InjuryRisk {
        risk_level: RiskLevel::ALL[class],
        confidence: p * 100.0,
        probabilities: RiskProbabilities {
            low: probs[0] * 100.0,
            moderate: probs[1] * 100.0,
            high: probs[2] * 100.0,
        },
    }
}

/// Race time result from a predicted 5K in seconds.
#[must_use]
pub fn performance(raw_seconds: f32) -> Interpretation {
    let t5 = if raw_seconds.is_nan() {
        MIN_5K_SECONDS
    } else {
        raw_seconds.max(MIN_5K_SECONDS)
    };
    let t5 = f64::from(t5).round();
    Interpretation::Performance {
        predicted_5k_seconds: seconds(t5),
        predicted_5k_formatted: format_mmss(seconds(t5)),
        predicted_10k_seconds: seconds(riegel(t5, 10.0)),
        predicted_half_marathon_seconds: seconds(riegel(t5, HALF_MARATHON_KM)),
        predicted_marathon_seconds: seconds(riegel(t5, MARATHON_KM)),
    }
}

/// `T(d) = T5 · (d / 5)^1.06`
#[must_use]
pub fn riegel(t5_seconds: f64, distance_km: f64) -> f64 {
    t5_seconds * (distance_km / 5.0).powf(RIEGEL_EXPONENT)
}

/// `m:ss`, minutes unbounded.
#[must_use]
pub fn format_mmss(total_seconds: u32) -> String {
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

fn seconds(value: f64) -> u32 {
    value.round().clamp(0.0, f64::from(u32::MAX)) as u32
}
