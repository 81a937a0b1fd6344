//! Rule-based scoring endpoints
//!
//! Deterministic arithmetic over request fields, served under `/api/v1`.
//! These are the fallback callers are pointed at when the model backend is
//! unavailable.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::interpret::RiskLevel;
use crate::{Error, Result};

/// Gait biomechanics for the injury-risk rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaitAnalysisRequest {
    /// Ground contact time (ms)
    pub ground_contact_time_ms: f64,
    /// Vertical oscillation (cm)
    pub vertical_oscillation_cm: f64,
    /// Steps per minute
    pub cadence_spm: u32,
    /// Stride length (m)
    pub stride_length_m: f64,
    /// Forward lean (degrees)
    #[serde(default)]
    pub forward_lean_degrees: Option<f64>,
    /// Hip drop (degrees)
    #[serde(default)]
    pub hip_drop_degrees: Option<f64>,
    /// Average pace (min/km)
    pub avg_pace_min_per_km: f64,
}

/// Injury-risk rule result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryRiskResponse {
    /// Accumulated score in [0, 1], two decimals
    pub risk_score: f64,
    /// Bucketed score
    pub risk_level: RiskLevel,
    /// Triggered rules
    pub risk_factors: Vec<String>,
    /// Suggested corrections
    pub recommendations: Vec<String>,
}

/// Weekly training summary used by the forecast and load rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingLoadRequest {
    /// Weekly distance (km)
    pub weekly_distance_km: f64,
    /// Weekly duration (minutes)
    pub weekly_duration_minutes: u32,
    /// Runs this week
    pub run_count: u32,
    /// Average pace (min/km)
    pub avg_pace_min_per_km: f64,
    /// Share of easy/moderate/hard running
    #[serde(default)]
    pub intensity_distribution: Option<HashMap<String, f64>>,
    /// Resting heart rate (bpm)
    #[serde(default)]
    pub resting_heart_rate: Option<u32>,
    /// HRV RMSSD (ms)
    #[serde(default)]
    pub hrv_rmssd: Option<f64>,
}

/// Race-time forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceForecast {
    /// 5K (s)
    pub predicted_5k_seconds: u32,
    /// 10K (s)
    pub predicted_10k_seconds: u32,
    /// Half marathon (s)
    pub predicted_half_marathon_seconds: u32,
    /// Marathon (s)
    pub predicted_marathon_seconds: u32,
    /// Confidence in [0.5, 0.95], two decimals
    pub confidence: f64,
    /// Training suggestions
    pub training_suggestions: Vec<String>,
}

/// Training status from the acute:chronic workload ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    /// ACWR < 0.8
    Detraining,
    /// 0.8 ≤ ACWR ≤ 1.3
    Optimal,
    /// 1.3 < ACWR ≤ 1.5, or optimal with low HRV
    Overreaching,
    /// ACWR > 1.5
    Overtraining,
}

/// Training load analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingLoadResponse {
    /// Acute load, one decimal
    pub acute_load: f64,
    /// Chronic load, one decimal
    pub chronic_load: f64,
    /// ACWR, two decimals
    pub acute_chronic_ratio: f64,
    /// Status bucket
    pub training_status: TrainingStatus,
    /// Advice for the status
    pub recommendation: String,
}

/// Chronic load as a fraction of acute load.
// TODO: replace with a 4-week rolling average once weekly history is passed in
pub const CHRONIC_LOAD_FACTOR: f64 = 0.85;

/// HRV below this downgrades an optimal status.
pub const LOW_HRV_RMSSD: f64 = 30.0;

/// Score gait biomechanics for injury risk.
#[must_use]
pub fn injury_risk(req: &GaitAnalysisRequest) -> InjuryRiskResponse {
    let mut score = 0.0_f64;
    let mut factors = Vec::new();
    let mut recommendations = Vec::new();

    if req.cadence_spm < 160 {
        score += 0.2;
        factors.push("Very low cadence increases impact forces");
        recommendations.push("Increase step rate by 5-10% over 4 weeks");
    } else if req.cadence_spm < 170 {
        score += 0.1;
        factors.push("Below-optimal cadence");
    }

    if req.ground_contact_time_ms > 300.0 {
        score += 0.15;
        factors.push("Extended ground contact time, overstriding risk");
        recommendations.push("Focus on quick, light steps");
    }

    if req.vertical_oscillation_cm > 12.0 {
        score += 0.15;
        factors.push("High vertical oscillation increases joint stress");
        recommendations.push("Run 'quiet' and minimize up-down motion");
    }

    if req.hip_drop_degrees.is_some_and(|hip| hip > 8.0) {
        score += 0.2;
        factors.push("Excessive hip drop, a glute weakness indicator");
        recommendations.push("Add single-leg glute bridges and clamshells 3x/week");
    }

    if req.stride_length_m > 1.3 && req.cadence_spm < 170 {
        score += 0.15;
        factors.push("Long stride with low cadence is an overstriding pattern");
        recommendations.push("Shorten stride and increase turnover");
    }

    let score = score.min(1.0);
    let risk_level = if score < 0.3 {
        RiskLevel::Low
    } else if score < 0.6 {
        RiskLevel::Moderate
    } else {
        RiskLevel::High
    };

    if factors.is_empty() {
        factors.push("No significant risk factors detected");
    }
    if recommendations.is_empty() {
        recommendations.push("Good biomechanics! Maintain current form focus.");
    }

    InjuryRiskResponse {
        risk_score: round_to(score, 2),
        risk_level,
        risk_factors: factors.into_iter().map(String::from).collect(),
        recommendations: recommendations.into_iter().map(String::from).collect(),
    }
}

/// Forecast race times from training pace and volume.
///
/// # Errors
///
/// Returns `Error::Validation` if the pace is not a positive number.
pub fn forecast(req: &TrainingLoadRequest) -> Result<PerformanceForecast> {
    check_pace(req.avg_pace_min_per_km)?;

    // race pace ~15% faster than average training pace
    let race_pace_sec_per_km = req.avg_pace_min_per_km * 60.0 * 0.85;
    let t5 = (race_pace_sec_per_km * 5.0).trunc();
    let at = |km: f64| (t5 * (km / 5.0).powf(1.06)).trunc() as u32;

    let mut confidence = 0.5;
    if req.weekly_distance_km >= 50.0 {
        confidence += 0.2;
    } else if req.weekly_distance_km >= 30.0 {
        confidence += 0.15;
    } else if req.weekly_distance_km >= 20.0 {
        confidence += 0.1;
    }
    if req.run_count >= 5 {
        confidence += 0.1;
    }
    if req.run_count >= 4 {
        confidence += 0.05;
    }

    let mut suggestions = Vec::new();
    if req.weekly_distance_km < 30.0 {
        suggestions.push("Increase weekly mileage gradually to improve endurance");
    }
    if req.run_count < 4 {
        suggestions.push("Add 1-2 more easy runs per week for consistency");
    }
    if req.avg_pace_min_per_km > 7.0 {
        suggestions.push("Include one tempo run per week to improve speed");
    }
    if suggestions.is_empty() {
        suggestions.push("Great training, maintain consistency!");
    }

    Ok(PerformanceForecast {
        predicted_5k_seconds: t5 as u32,
        predicted_10k_seconds: at(10.0),
        predicted_half_marathon_seconds: at(21.1),
        predicted_marathon_seconds: at(42.2),
        confidence: round_to(f64::min(confidence, 0.95), 2),
        training_suggestions: suggestions.into_iter().map(String::from).collect(),
    })
}

/// Acute:chronic workload analysis.
///
/// # Errors
///
/// Returns `Error::Validation` if the pace is not a positive number.
pub fn training_load(req: &TrainingLoadRequest) -> Result<TrainingLoadResponse> {
    check_pace(req.avg_pace_min_per_km)?;

    let acute = req.weekly_distance_km * (1.0 + 1.0 / req.avg_pace_min_per_km);
    let chronic = acute * CHRONIC_LOAD_FACTOR;
    let acwr = if chronic > 0.0 { acute / chronic } else { 1.0 };

    let (mut status, mut recommendation) = if acwr < 0.8 {
        (
            TrainingStatus::Detraining,
            "Your training load has decreased significantly. Gradually increase volume to maintain fitness.",
        )
    } else if acwr <= 1.3 {
        (
            TrainingStatus::Optimal,
            "Training load is in the sweet spot. Maintain current progression rate.",
        )
    } else if acwr <= 1.5 {
        (
            TrainingStatus::Overreaching,
            "Training load spike detected. Consider an easy week to allow adaptation.",
        )
    } else {
        (
            TrainingStatus::Overtraining,
            "High injury risk! Reduce volume by 30-40% this week and focus on recovery.",
        )
    };

    if status == TrainingStatus::Optimal && req.hrv_rmssd.is_some_and(|hrv| hrv < LOW_HRV_RMSSD) {
        status = TrainingStatus::Overreaching;
        recommendation = "Low HRV detected despite normal load. Prioritize recovery this week.";
    }

    Ok(TrainingLoadResponse {
        acute_load: round_to(acute, 1),
        chronic_load: round_to(chronic, 1),
        acute_chronic_ratio: round_to(acwr, 2),
        training_status: status,
        recommendation: recommendation.to_string(),
    })
}

fn check_pace(pace: f64) -> Result<()> {
    if pace.is_finite() && pace > 0.0 {
        Ok(())
    } else {
        Err(Error::Validation(
            "avg_pace_min_per_km must be a positive number".to_string(),
        ))
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gait() -> GaitAnalysisRequest {
        GaitAnalysisRequest {
            ground_contact_time_ms: 240.0,
            vertical_oscillation_cm: 8.0,
            cadence_spm: 178,
            stride_length_m: 1.1,
            forward_lean_degrees: None,
            hip_drop_degrees: None,
            avg_pace_min_per_km: 5.0,
        }
    }

    fn week() -> TrainingLoadRequest {
        TrainingLoadRequest {
            weekly_distance_km: 40.0,
            weekly_duration_minutes: 220,
            run_count: 4,
            avg_pace_min_per_km: 5.5,
            intensity_distribution: None,
            resting_heart_rate: None,
            hrv_rmssd: None,
        }
    }

    #[test]
    fn test_clean_gait_is_low_risk() {
        let resp = injury_risk(&gait());
        assert_eq!(resp.risk_score, 0.0);
        assert_eq!(resp.risk_level, RiskLevel::Low);
        assert_eq!(resp.risk_factors, vec!["No significant risk factors detected"]);
        assert_eq!(resp.recommendations.len(), 1);
    }

    #[test]
    fn test_every_rule_fires_and_caps() {
        let req = GaitAnalysisRequest {
            ground_contact_time_ms: 320.0,
            vertical_oscillation_cm: 13.0,
            cadence_spm: 150,
            stride_length_m: 1.4,
            hip_drop_degrees: Some(9.0),
            ..gait()
        };
        let resp = injury_risk(&req);
        // 0.2 + 0.15 + 0.15 + 0.2 + 0.15 = 0.85
        assert_eq!(resp.risk_score, 0.85);
        assert_eq!(resp.risk_level, RiskLevel::High);
        assert_eq!(resp.risk_factors.len(), 5);
    }

    #[test]
    fn test_moderate_band() {
        let req = GaitAnalysisRequest {
            cadence_spm: 165,
            ground_contact_time_ms: 310.0,
            hip_drop_degrees: Some(9.0),
            ..gait()
        };
        // 0.1 + 0.15 + 0.2 = 0.45
        assert_eq!(injury_risk(&req).risk_level, RiskLevel::Moderate);
    }

    #[test]
    fn test_forecast_riegel_and_confidence() {
        let f = forecast(&week()).unwrap();
        // 5.5 * 60 * 0.85 * 5 = 1402.5
        assert_eq!(f.predicted_5k_seconds, 1402);
        assert_eq!(f.predicted_10k_seconds, (1402.0 * 2.0_f64.powf(1.06)) as u32);
        // 0.5 + 0.15 (>= 30 km) + 0.05 (>= 4 runs)
        assert_eq!(f.confidence, 0.7);
        assert_eq!(f.training_suggestions, vec!["Great training, maintain consistency!"]);
    }

    #[test]
    fn test_forecast_confidence_stacks() {
        let req = TrainingLoadRequest {
            weekly_distance_km: 80.0,
            run_count: 6,
            ..week()
        };
        assert_eq!(forecast(&req).unwrap().confidence, 0.85);
    }

    #[test]
    fn test_training_load_placeholder_ratio() {
        let resp = training_load(&week()).unwrap();
        assert_eq!(resp.acute_chronic_ratio, 1.18);
        assert_eq!(resp.training_status, TrainingStatus::Optimal);
        // 40 * (1 + 1/5.5) = 47.27
        assert_eq!(resp.acute_load, 47.3);
    }

    #[test]
    fn test_low_hrv_downgrades_optimal() {
        let req = TrainingLoadRequest {
            hrv_rmssd: Some(25.0),
            ..week()
        };
        let resp = training_load(&req).unwrap();
        assert_eq!(resp.training_status, TrainingStatus::Overreaching);
        assert!(resp.recommendation.contains("Low HRV"));
    }

    #[test]
    fn test_zero_pace_rejected() {
        let req = TrainingLoadRequest {
            avg_pace_min_per_km: 0.0,
            ..week()
        };
        assert!(matches!(training_load(&req), Err(Error::Validation(_))));
        assert!(matches!(forecast(&req), Err(Error::Validation(_))));
    }
}
