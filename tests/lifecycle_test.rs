//! End-to-end model lifecycle against a temporary models directory
//!
//! 1. Build (synthesize → train → normalize → convert → publish)
//! 2. List, download, read normalization params
//! 3. Run quantization-aware inference and interpret the output
//! 4. Reject what was never built, what was tampered with, and what is not
//!    an artifact name

use std::fs;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use apexrun_ml::backend::{
    trainer::validation_loss, BackendCapability, BackendKind, Hyperparameters, ModelBackend,
    NativeBackend,
};
use apexrun_ml::config::Config;
use apexrun_ml::dataset::{synthesize, Dataset};
use apexrun_ml::inference::InferenceEngine;
use apexrun_ml::interpret::{self, FormLevel, Interpretation};
use apexrun_ml::pipeline::{BuildPipeline, BuildStatus};
use apexrun_ml::artifact::Artifact;
use apexrun_ml::normalization::NormalizationParams;
use apexrun_ml::quant::{DType, QuantizationMode, QuantizationScheme, MAX_CALIBRATION_ROWS};
use apexrun_ml::store::ArtifactStore;
use apexrun_ml::task::Task;
use apexrun_ml::tracking::RunStore;
use apexrun_ml::Error;
use tempfile::TempDir;

fn small_config(dir: &TempDir, quantization: QuantizationMode) -> Config {
    Config::builder()
        .models_dir(dir.path())
        .quantization(quantization)
        .samples(300)
        .epochs(3)
        .build()
        .unwrap()
}

fn build(config: &Config, tasks: &[Task]) -> ArtifactStore {
    let store = ArtifactStore::open(&config.models_dir).unwrap();
    let runs = Mutex::new(RunStore::new());
    let summary = BuildPipeline::new(config, &store, &NativeBackend::new(), &runs).build(tasks);
    assert_eq!(summary.status, BuildStatus::Success, "{:?}", summary.errors);
    store
}

/// Mid-range feature vector for a task: the mean of its synthetic data.
fn typical_features(task: Task) -> Vec<f32> {
    let ds = synthesize(task, 64).unwrap();
    (0..task.input_dim())
        .map(|j| ds.column(j).iter().sum::<f32>() / ds.len() as f32)
        .collect()
}

// ============================================================================
// Build and catalog
// ============================================================================

#[test]
fn test_catalog_complete_after_build() {
    let dir = TempDir::new().unwrap();
    let config = small_config(&dir, QuantizationMode::Float16);
    let store = build(&config, &Task::ALL);

    let catalog = store.catalog().unwrap();
    assert_eq!(catalog.len(), Task::ALL.len());
    for (entry, task) in catalog.iter().zip(Task::ALL) {
        assert_eq!(entry.filename, task.artifact_filename());
        assert_eq!(entry.download_url, format!("/models/{}", task.artifact_filename()));
        assert_eq!(entry.input_features.len(), task.input_dim());
        assert!(entry.size_kb > 0.0);

        let bytes = store.download(&entry.filename).unwrap();
        assert_eq!(bytes, store.read_artifact(task).unwrap().bytes());

        let norm = store.read_normalization(task).unwrap();
        assert_eq!(norm.mean.len(), task.input_dim());
        assert!(norm.std.iter().all(|s| *s >= 0.0));
    }
}

#[test]
fn test_rebuild_replaces_artifact() {
    let dir = TempDir::new().unwrap();
    let store = build(&small_config(&dir, QuantizationMode::None), &[Task::GaitForm]);
    let before = store.read_artifact(Task::GaitForm).unwrap();
    assert_eq!(before.metadata().quantization, QuantizationMode::None);

    let store = build(&small_config(&dir, QuantizationMode::Dynamic), &[Task::GaitForm]);
    let after = store.read_artifact(Task::GaitForm).unwrap();
    assert_eq!(after.metadata().quantization, QuantizationMode::Dynamic);
    assert!(after.metadata().size_bytes < before.metadata().size_bytes);
    assert_eq!(store.catalog().unwrap().len(), 1);

    // no temp files left behind
    let leftovers = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn test_readers_never_see_a_partial_republish() {
    const ROUNDS: usize = 30;
    const READERS: usize = 4;

    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let task = Task::InjuryRisk;
    let filename = task.artifact_filename();

    let dataset = synthesize(task, 300).unwrap();
    let backend = NativeBackend::new();
    let hyper = Hyperparameters {
        epochs: 2,
        ..Hyperparameters::default()
    };
    let model = backend.train(&task.model_spec(), &dataset, &hyper).unwrap();
    let normalization = NormalizationParams::from_dataset(&dataset).unwrap();
    let versions: Vec<Artifact> = [
        QuantizationMode::Float16,
        QuantizationMode::Dynamic,
        QuantizationMode::Int8,
    ]
    .into_iter()
    .map(|mode| {
        let scheme = QuantizationScheme::for_mode(mode, dataset.head(MAX_CALIBRATION_ROWS));
        backend.convert(&model, &scheme).unwrap()
    })
    .collect();
    store.publish(&versions[0], &normalization).unwrap();

    let done = AtomicBool::new(false);
    let reads = AtomicUsize::new(0);
    thread::scope(|scope| {
        for _ in 0..READERS {
            scope.spawn(|| {
                loop {
                    let finished = done.load(Ordering::Acquire);
                    let artifact = store.read_artifact(task).unwrap();
                    assert!(versions.iter().any(|v| v.bytes() == artifact.bytes()));

                    let bytes = store.download(&filename).unwrap();
                    let decoded = Artifact::from_bytes(bytes).unwrap();
                    assert!(versions.iter().any(|v| v.bytes() == decoded.bytes()));
                    assert_eq!(store.read_normalization(task).unwrap(), normalization);
                    reads.fetch_add(1, Ordering::Relaxed);
                    if finished {
                        break;
                    }
                }
            });
        }

        scope.spawn(|| {
            for round in 0..ROUNDS {
                let artifact = &versions[round % versions.len()];
                store
                    .with_task_lock(task, || store.publish(artifact, &normalization))
                    .unwrap();
            }
            done.store(true, Ordering::Release);
        });
    });

    assert!(reads.load(Ordering::Relaxed) > 0);
    let last = store.read_artifact(task).unwrap();
    assert_eq!(last.bytes(), versions[(ROUNDS - 1) % versions.len()].bytes());
}

#[test]
fn test_dataset_snapshot_reloads() {
    let dir = TempDir::new().unwrap();
    let snapshots = dir.path().join("snapshots");
    let config = Config::builder()
        .models_dir(dir.path().join("models"))
        .samples(120)
        .epochs(1)
        .snapshot_dir(Some(snapshots.clone()))
        .build()
        .unwrap();
    build(&config, &[Task::InjuryRisk]);

    let reloaded = Dataset::read_parquet(Task::InjuryRisk, snapshots.join("injury_risk.parquet"))
        .unwrap();
    assert_eq!(reloaded, synthesize(Task::InjuryRisk, 120).unwrap());
}

// ============================================================================
// Inference
// ============================================================================

#[test]
fn test_float_inference_matches_network() {
    let dir = TempDir::new().unwrap();
    let store = build(&small_config(&dir, QuantizationMode::None), &[Task::Performance]);
    let capability = BackendCapability::detect(BackendKind::Native);
    let engine = InferenceEngine::new(&store, &capability);

    let features = typical_features(Task::Performance);
    let prediction = engine.predict(Task::Performance, &features).unwrap();
    let artifact = store.read_artifact(Task::Performance).unwrap();
    assert_eq!(prediction, artifact.network().forward(&features));

    match interpret::interpret(Task::Performance, &prediction).unwrap() {
        Interpretation::Performance {
            predicted_5k_seconds,
            predicted_5k_formatted,
            ..
        } => {
            assert!(predicted_5k_seconds >= 720);
            assert!(predicted_5k_formatted.contains(':'));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_int8_inference_quantizes_and_dequantizes() {
    let dir = TempDir::new().unwrap();
    let store = build(&small_config(&dir, QuantizationMode::Int8), &[Task::InjuryRisk]);
    let artifact = store.read_artifact(Task::InjuryRisk).unwrap();

    let meta = artifact.metadata();
    assert_eq!(meta.input_dtype, DType::Uint8);
    assert_eq!(meta.output_dtype, DType::Uint8);
    assert_eq!(meta.calibration_samples, Some(200));
    let io = artifact.int8_io().unwrap();

    let capability = BackendCapability::detect(BackendKind::Native);
    let engine = InferenceEngine::new(&store, &capability);
    let features = typical_features(Task::InjuryRisk);
    let (task, prediction) = engine.predict_named("injury_risk", &features).unwrap();
    assert_eq!(task, Task::InjuryRisk);

    let x = io.input.dequantize_slice(&io.input.quantize_slice(&features));
    let y = artifact.network().forward(&x);
    let expected = io.output.dequantize_slice(&io.output.quantize_slice(&y));
    assert_eq!(prediction, expected);
    assert!(prediction.iter().all(|p| (-0.01..=1.01).contains(p)));
}

#[test]
fn test_feature_count_contract() {
    let dir = TempDir::new().unwrap();
    let store = build(&small_config(&dir, QuantizationMode::Float16), &[Task::GaitForm]);
    let capability = BackendCapability::detect(BackendKind::Native);
    let engine = InferenceEngine::new(&store, &capability);

    let mut features = typical_features(Task::GaitForm);
    assert_eq!(engine.predict(Task::GaitForm, &features).unwrap().len(), 1);

    features.push(1.0);
    let err = engine.predict(Task::GaitForm, &features).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    features.truncate(3);
    assert!(matches!(
        engine.predict(Task::GaitForm, &features),
        Err(Error::Validation(_))
    ));

    assert!(matches!(
        engine.predict_named("sprint", &features),
        Err(Error::UnknownTask(_))
    ));
}

#[test]
fn test_disabled_backend_refuses_inference() {
    let dir = TempDir::new().unwrap();
    let store = build(&small_config(&dir, QuantizationMode::Float16), &[Task::GaitForm]);
    let capability = BackendCapability::detect(BackendKind::Disabled);
    let engine = InferenceEngine::new(&store, &capability);

    let err = engine
        .predict(Task::GaitForm, &typical_features(Task::GaitForm))
        .unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(_)));
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn test_unbuilt_artifacts_not_found() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::open(dir.path()).unwrap();
    let capability = BackendCapability::detect(BackendKind::Native);
    let engine = InferenceEngine::new(&store, &capability);

    assert!(store.catalog().unwrap().is_empty());
    for task in Task::ALL {
        assert!(matches!(store.read_artifact(task), Err(Error::NotFound(_))));
        assert!(matches!(store.read_normalization(task), Err(Error::NotFound(_))));
        assert!(matches!(
            store.download(&task.artifact_filename()),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            engine.predict(task, &typical_features(task)),
            Err(Error::NotFound(_))
        ));
    }
}

#[test]
fn test_unknown_filenames_never_served() {
    let dir = TempDir::new().unwrap();
    let store = build(&small_config(&dir, QuantizationMode::Float16), &[Task::GaitForm]);
    fs::write(dir.path().join("notes.artifact"), b"not a model").unwrap();

    for name in [
        "notes.artifact",
        "gait_form_norm_params.json",
        "../gait_form_model.artifact",
        "gait_form_model.artifact/",
        "",
    ] {
        assert!(
            matches!(store.download(name), Err(Error::NotFound(_))),
            "{name:?} was served"
        );
    }
    assert!(store.download("gait_form_model.artifact").is_ok());
}

#[test]
fn test_corrupt_and_truncated_artifacts_rejected() {
    let dir = TempDir::new().unwrap();
    let store = build(&small_config(&dir, QuantizationMode::Float16), &[Task::Performance]);
    let path = store.artifact_path(Task::Performance);
    let original = fs::read(&path).unwrap();

    let mut flipped = original.clone();
    let mid = flipped.len() / 2;
    flipped[mid] ^= 0x40;
    fs::write(&path, &flipped).unwrap();
    assert!(matches!(
        store.read_artifact(Task::Performance),
        Err(Error::CorruptArtifact(_))
    ));

    fs::write(&path, &original[..original.len() - 3]).unwrap();
    assert!(matches!(
        store.read_artifact(Task::Performance),
        Err(Error::CorruptArtifact(_))
    ));

    let capability = BackendCapability::detect(BackendKind::Native);
    let engine = InferenceEngine::new(&store, &capability);
    assert!(matches!(
        engine.predict(Task::Performance, &typical_features(Task::Performance)),
        Err(Error::CorruptArtifact(_))
    ));

    fs::write(&path, &original).unwrap();
    assert!(store.read_artifact(Task::Performance).is_ok());
}

// ============================================================================
// Training and interpretation
// ============================================================================

#[test]
fn test_restored_weights_are_best_epoch() {
    let dataset = synthesize(Task::GaitForm, 400).unwrap();
    let hyper = Hyperparameters {
        epochs: 12,
        early_stop_patience: 3,
        lr_patience: 2,
        ..Hyperparameters::default()
    };
    let model = NativeBackend::new()
        .train(&Task::GaitForm.model_spec(), &dataset, &hyper)
        .unwrap();
    let report = &model.report;

    assert!(report.epochs_completed() <= 12);
    assert!(report.best_epoch >= 1 && report.best_epoch <= report.epochs_completed());
    for stats in &report.history {
        assert!(report.best_val_loss <= stats.val_loss);
    }
    if report.early_stopped() {
        assert_eq!(report.epochs_completed(), report.best_epoch + 3);
    }

    let restored = validation_loss(&model.network, &dataset, hyper.validation_fraction).unwrap();
    assert!(
        (restored - report.best_val_loss).abs() <= 1e-4 * report.best_val_loss.max(1.0),
        "restored {restored} vs best {}",
        report.best_val_loss
    );
}

#[test]
fn test_interpretation_boundaries() {
    assert_eq!(
        interpret::gait_form(100.0),
        Interpretation::GaitForm {
            form_score: 100.0,
            level: FormLevel::Excellent
        }
    );
    assert_eq!(
        interpret::gait_form(-5.0),
        Interpretation::GaitForm {
            form_score: 0.0,
            level: FormLevel::Poor
        }
    );
    assert!(interpret::interpret(Task::InjuryRisk, &[0.2, 0.8]).is_err());
}

#[test]
fn test_riegel_chain() {
    match interpret::performance(900.0) {
        Interpretation::Performance {
            predicted_5k_seconds,
            predicted_5k_formatted,
            predicted_10k_seconds,
            predicted_half_marathon_seconds,
            predicted_marathon_seconds,
        } => {
            assert_eq!(predicted_5k_seconds, 900);
            assert_eq!(predicted_5k_formatted, "15:00");
            assert_eq!(predicted_10k_seconds, 1876);
            assert_eq!(predicted_half_marathon_seconds, 4140);
            assert_eq!(predicted_marathon_seconds, 8632);
        }
        other => panic!("unexpected {other:?}"),
    }
}
