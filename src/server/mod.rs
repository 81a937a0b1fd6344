//! HTTP surface using axum.
//!
//! Endpoints:
//! - GET  /health                        - liveness plus backend name
//! - GET  /models                        - catalog of built artifacts
//! - GET  /models/:filename              - artifact bytes
//! - GET  /models/:task/normalization    - exported normalization params
//! - POST /models/build                  - train and export every task
//! - POST /inference                     - run a stored artifact
//! - GET  /runs                          - tracking of the latest build per task
//! - POST /api/v1/gait/injury-risk       - rule-based injury risk
//! - POST /api/v1/performance/forecast   - rule-based race forecast
//! - POST /api/v1/training/load          - rule-based training load

mod error;

pub use error::ApiError;

use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::backend::BackendCapability;
use crate::config::Config;
use crate::inference::InferenceEngine;
use crate::interpret::{interpret, Interpretation};
use crate::normalization::NormalizationParams;
use crate::pipeline::{BuildPipeline, BuildStatus, BuildSummary};
use crate::rules::{
    self, GaitAnalysisRequest, InjuryRiskResponse, PerformanceForecast, TrainingLoadRequest,
    TrainingLoadResponse,
};
use crate::store::{ArtifactStore, CatalogEntry};
use crate::task::Task;
use crate::tracking::{RunStore, RunSummary};
use crate::{Error, Result};

/// Process-wide state shared by all handlers.
///
/// The store starts out empty and is only populated by builds.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<ArtifactStore>,
    capability: BackendCapability,
    runs: Arc<Mutex<RunStore>>,
}

impl AppState {
    /// Open the configured store and resolve the backend.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the models directory cannot be created.
    pub fn new(config: Config) -> Result<Self> {
        let capability = BackendCapability::detect(config.backend);
        Self::with_capability(config, capability)
    }

    /// Like [`AppState::new`] with an explicit backend capability.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the models directory cannot be created.
    pub fn with_capability(config: Config, capability: BackendCapability) -> Result<Self> {
        let store = ArtifactStore::open(&config.models_dir)?;
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            capability,
            runs: Arc::new(Mutex::new(RunStore::new())),
        })
    }

    /// The artifact store.
    #[must_use]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }
}

/// Build the router with all endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/models", get(list_models))
        .route(
            "/models/build",
            post(build_models).fallback(build_is_not_a_model),
        )
        .route("/models/:filename", get(download_model))
        .route("/models/:task/normalization", get(normalization))
        .route("/inference", post(inference))
        .route("/runs", get(runs))
        .route("/api/v1/gait/injury-risk", post(gait_injury_risk))
        .route("/api/v1/performance/forecast", post(performance_forecast))
        .route("/api/v1/training/load", post(training_load))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `config.bind_addr()` and serve until the process stops.
///
/// # Errors
///
/// Returns an IO error if the store cannot be opened or the address cannot
/// be bound.
pub async fn serve(config: Config) -> Result<()> {
    let addr = config.bind_addr();
    let state = AppState::new(config)?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, backend = state.capability.name(), "Listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ── Request / Response types ────────────────────────────────────────

/// Liveness response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `healthy`
    pub status: String,
    /// Crate version
    pub version: String,
    /// Resolved backend name
    pub backend: String,
}

/// Inference request.
#[derive(Debug, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Task name
    pub model: String,
    /// Raw feature vector in model input order
    pub features: Vec<f32>,
}

/// Inference response.
#[derive(Debug, Serialize, Deserialize)]
pub struct InferenceResponse {
    /// Task name
    pub model: String,
    /// Raw (dequantized) model output
    pub prediction: Vec<f32>,
    /// Domain view of the prediction
    pub interpretation: Interpretation,
}

// ── Handlers ────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.capability.name().to_string(),
    })
}

async fn list_models(
    State(state): State<AppState>,
) -> std::result::Result<Json<Vec<CatalogEntry>>, ApiError> {
    Ok(Json(state.store.catalog()?))
}

async fn download_model(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> std::result::Result<Response, ApiError> {
    let bytes = state.store.download(&filename)?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}

async fn normalization(
    State(state): State<AppState>,
    Path(task): Path<String>,
) -> std::result::Result<Json<NormalizationParams>, ApiError> {
    let task: Task = task.parse()?;
    Ok(Json(state.store.read_normalization(task)?))
}

async fn build_models(State(state): State<AppState>) -> std::result::Result<Response, ApiError> {
    state.capability.backend()?;

    let summary = tokio::task::spawn_blocking(move || -> Result<BuildSummary> {
        let backend = state.capability.backend()?;
        Ok(BuildPipeline::new(&state.config, &state.store, backend, &state.runs).build_all())
    })
    .await
    .map_err(|e| Error::Other(format!("build task did not complete: {e}")))??;

    info!(
        status = ?summary.status,
        total_kb = summary.total_kb(),
        "Build finished"
    );
    if summary.status == BuildStatus::Failed {
        let body = json!({
            "error": "every task failed to build",
            "errors": summary.errors,
        });
        return Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response());
    }
    Ok(Json(summary).into_response())
}

/// Non-POST requests to `/models/build` are treated as a lookup of a model
/// file called `build`, which never exists.
async fn build_is_not_a_model() -> ApiError {
    ApiError(Error::NotFound("model file 'build'".to_string()))
}

async fn inference(
    State(state): State<AppState>,
    Json(req): Json<InferenceRequest>,
) -> std::result::Result<Json<InferenceResponse>, ApiError> {
    let response = tokio::task::spawn_blocking(move || -> Result<InferenceResponse> {
        let engine = InferenceEngine::new(&state.store, &state.capability);
        let (task, prediction) = engine.predict_named(&req.model, &req.features)?;
        let interpretation = interpret(task, &prediction)?;
        Ok(InferenceResponse {
            model: task.name().to_string(),
            prediction,
            interpretation,
        })
    })
    .await
    .map_err(|e| Error::Other(format!("inference task did not complete: {e}")))??;
    Ok(Json(response))
}

async fn runs(State(state): State<AppState>) -> Json<Vec<RunSummary>> {
    let runs = state.runs.lock().unwrap_or_else(PoisonError::into_inner);
    Json(runs.latest_summaries())
}

async fn gait_injury_risk(Json(req): Json<GaitAnalysisRequest>) -> Json<InjuryRiskResponse> {
    Json(rules::injury_risk(&req))
}

async fn performance_forecast(
    Json(req): Json<TrainingLoadRequest>,
) -> std::result::Result<Json<PerformanceForecast>, ApiError> {
    Ok(Json(rules::forecast(&req)?))
}

async fn training_load(
    Json(req): Json<TrainingLoadRequest>,
) -> std::result::Result<Json<TrainingLoadResponse>, ApiError> {
    Ok(Json(rules::training_load(&req)?))
}
