//! Property-based tests for apexrun-ml
//!
//! - Synthesizer determinism and label domains
//! - int8 affine round trip within one quantization step
//! - Feature-count contract
//! - Interpretation bounds and Riegel monotonicity
//! - Run with ProptestConfig::with_cases(64)

use apexrun_ml::dataset::{synthesize_with_seed, Labels};
use apexrun_ml::inference::validate_features;
use apexrun_ml::interpret::{self, FormLevel, Interpretation, RiskLevel};
use apexrun_ml::quant::QuantParams;
use apexrun_ml::task::Task;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn arb_task() -> impl Strategy<Value = Task> {
    prop_oneof![
        Just(Task::GaitForm),
        Just(Task::InjuryRisk),
        Just(Task::Performance),
    ]
}

/// Calibration values spanning a random range.
fn arb_calibration() -> impl Strategy<Value = Vec<f32>> {
    (-500.0f32..500.0, 0.01f32..1000.0).prop_flat_map(|(lo, width)| {
        proptest::collection::vec(lo..=lo + width, 2..64)
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // ========================================================================
    // Synthesizer
    // ========================================================================

    /// Property: same (task, seed, n) gives identical datasets
    #[test]
    fn prop_synthesizer_deterministic(task in arb_task(), seed in any::<u64>(), n in 1usize..64) {
        let a = synthesize_with_seed(task, seed, n).unwrap();
        let b = synthesize_with_seed(task, seed, n).unwrap();
        prop_assert_eq!(a, b);
    }

    /// Property: shape and label domain follow the task contract
    #[test]
    fn prop_synthesizer_shape(task in arb_task(), seed in any::<u64>(), n in 1usize..64) {
        let ds = synthesize_with_seed(task, seed, n).unwrap();
        prop_assert_eq!(ds.len(), n);
        prop_assert_eq!(ds.n_features(), task.input_dim());
        prop_assert!(ds.features().iter().all(|v| v.is_finite()));
        match ds.labels() {
            Labels::Classes(c) => {
                prop_assert_eq!(task, Task::InjuryRisk);
                prop_assert!(c.iter().all(|&k| k < 3));
            }
            Labels::Regression(y) => {
                prop_assert_ne!(task, Task::InjuryRisk);
                prop_assert!(y.iter().all(|v| v.is_finite()));
                if task == Task::GaitForm {
                    prop_assert!(y.iter().all(|&v| (0.0..=100.0).contains(&v)));
                }
            }
        }
    }

    // ========================================================================
    // int8 affine quantization
    // ========================================================================

    /// Property: dequantize(quantize(x)) is within one step of x over the
    /// calibration samples
    #[test]
    fn prop_int8_round_trip_within_one_step(values in arb_calibration()) {
        let params = QuantParams::calibrate(values.iter());
        prop_assert!(params.scale > 0.0);
        for &v in &values {
            let back = params.dequantize(params.quantize(v));
            prop_assert!(
                (back - v).abs() <= params.scale * 1.001,
                "{} -> {} exceeds step {}", v, back, params.scale
            );
        }
    }

    /// Property: zero is exactly representable
    #[test]
    fn prop_int8_zero_exact(values in arb_calibration()) {
        let params = QuantParams::calibrate(values.iter());
        prop_assert_eq!(params.dequantize(params.quantize(0.0)), 0.0);
    }

    // ========================================================================
    // Feature-count contract
    // ========================================================================

    /// Property: only vectors of exactly input_dim finite values are accepted
    #[test]
    fn prop_feature_count_contract(task in arb_task(), len in 0usize..16, value in -1e3f32..1e3) {
        let features = vec![value; len];
        let result = validate_features(task, &features);
        prop_assert_eq!(result.is_ok(), len == task.input_dim());
    }

    // ========================================================================
    // Interpretation
    // ========================================================================

    /// Property: form score is clamped and bucketed consistently
    #[test]
    fn prop_gait_form_bounds(raw in -1e4f32..1e4) {
        match interpret::gait_form(raw) {
            Interpretation::GaitForm { form_score, level } => {
                prop_assert!((0.0..=100.0).contains(&form_score));
                prop_assert_eq!(level, FormLevel::from_score(form_score));
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }

    /// Property: the reported class is the argmax and confidence its percentage
    #[test]
    fn prop_injury_risk_argmax(a in 0.0f32..1.0, b in 0.0f32..1.0, c in 0.0f32..1.0) {
        match interpret::injury_risk([a, b, c]) {
            Interpretation::InjuryRisk { risk_level, confidence, probabilities } => {
                let best = a.max(b).max(c);
                prop_assert!((confidence - best * 100.0).abs() < 1e-3);
                let chosen = match risk_level {
                    RiskLevel::Low => probabilities.low,
                    RiskLevel::Moderate => probabilities.moderate,
                    RiskLevel::High => probabilities.high,
                };
                prop_assert!((chosen - confidence).abs() < 1e-3);
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }

    /// Property: race times are floored and strictly increase with distance
    #[test]
    fn prop_performance_floor_and_order(raw in -1e4f32..1e4) {
        match interpret::performance(raw) {
            Interpretation::Performance {
                predicted_5k_seconds,
                predicted_10k_seconds,
                predicted_half_marathon_seconds,
                predicted_marathon_seconds,
                ..
            } => {
                prop_assert!(predicted_5k_seconds >= 720);
                prop_assert!(predicted_10k_seconds > 2 * predicted_5k_seconds);
                prop_assert!(predicted_half_marathon_seconds > predicted_10k_seconds);
                prop_assert!(predicted_marathon_seconds > 2 * predicted_half_marathon_seconds);
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }
}
