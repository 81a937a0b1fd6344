//! Tests for error types

use apexrun_ml::Error;

#[test]
fn test_validation_error() {
    let error = Error::Validation("gait_form expects 8 features, got 3".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid input"));
    assert!(error_str.contains("expects 8 features"));
    assert!(error.is_client_error());
}

#[test]
fn test_unknown_task_lists_known_tasks() {
    let error = Error::UnknownTask("sprint".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("'sprint'"));
    for name in ["gait_form", "injury_risk", "performance"] {
        assert!(error_str.contains(name));
    }
    assert!(error.is_client_error());
}

#[test]
fn test_not_found_points_at_build() {
    let error = Error::NotFound("gait_form_model.artifact".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("gait_form_model.artifact"));
    assert!(error_str.contains("POST /models/build"));
    assert!(error.is_client_error());
}

#[test]
fn test_backend_unavailable_points_at_rules() {
    let error = Error::BackendUnavailable("disabled".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("backend unavailable"));
    assert!(error_str.contains("/api/v1"));
    assert!(!error.is_client_error());
}

#[test]
fn test_training_failure_names_task() {
    let error = Error::training("performance", "loss diverged at epoch 3");
    let error_str = format!("{error}");
    assert!(error_str.contains("Training failed for performance"));
    assert!(error_str.contains("epoch 3"));
    assert!(!error.is_client_error());
}

#[test]
fn test_corrupt_artifact_error() {
    let error = Error::CorruptArtifact("content hash mismatch".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Corrupt artifact"));
    assert!(error_str.contains("hash mismatch"));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
    let error: Error = io_error.into();
    let error_str = format!("{error}");
    assert!(error_str.contains("IO error"));
    assert!(error_str.contains("read-only"));
}

#[test]
fn test_json_error_conversion() {
    let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let error: Error = json_error.into();
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom error".to_string());
    assert_eq!(format!("{error}"), "custom error");
}

#[test]
fn test_error_debug() {
    let error = Error::Validation("test".to_string());
    let debug_str = format!("{error:?}");
    assert!(debug_str.contains("Validation"));
}
