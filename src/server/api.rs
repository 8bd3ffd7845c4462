//! Downstream consumer HTTP API.
//!
//! - GET  /v1/engine/status      : uptime, active strategy, scheduler stats
//! - GET  /v1/engine/strategy    : active strategy detail + catalog names
//! - POST /v1/engine/strategy    : force a strategy switch
//! - GET  /v1/engine/stats       : prediction/fetch/eviction counters
//! - GET  /v1/engine/health      : latest health snapshot
//! - GET  /v1/engine/experiments : experiment log (archive + active)
//! - POST /v1/engine/experiments : queue an experiment
//! - GET  /v1/engine/alerts      : SSE stream of health alerts
//! - GET  /health                : liveness
//! - GET  /metrics               : prometheus text format

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::engine::{EngineError, EngineStatus, PrefetchEngine};
use crate::health::monitor::HealthSnapshot;
use crate::server::alerts::alerts_to_sse_stream;
use crate::strategy::catalog::Strategy;
use crate::tune::experiment::{Experiment, ExperimentOutcome};
use crate::tune::params::TuningParams;
use crate::types::unix_now;

/// Application state shared across handlers.
pub struct AppState {
    pub engine: Arc<PrefetchEngine>,
    pub config: Arc<Config>,
    pub start_time: Instant,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/engine/status", get(engine_status))
        .route(
            "/v1/engine/strategy",
            get(get_strategy).post(force_strategy),
        )
        .route("/v1/engine/stats", get(engine_stats))
        .route("/v1/engine/health", get(engine_health))
        .route(
            "/v1/engine/experiments",
            get(list_experiments).post(queue_experiment),
        )
        .route("/v1/engine/alerts", get(alert_stream))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub uptime_secs: u64,
    #[serde(flatten)]
    pub engine: EngineStatus,
}

#[derive(Debug, Serialize)]
pub struct StrategyResponse {
    pub active: Strategy,
    pub score: f64,
    pub catalog: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForceStrategyRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub predictions_generated: u64,
    pub prefetches_completed: u64,
    pub prefetch_failures: u64,
    pub requests_admitted: u64,
    pub requests_rejected: u64,
    pub requests_dropped: u64,
    pub items_evicted: u64,
    pub items_downgraded: u64,
    pub current_params: TuningParams,
}

#[derive(Debug, Serialize)]
pub struct HealthSnapshotResponse {
    pub generated_at: u64,
    #[serde(flatten)]
    pub snapshot: HealthSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ExperimentInfo {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub outcome: Option<&'static str>,
    pub control_baseline: f64,
    pub samples: usize,
    pub variant_params: TuningParams,
}

impl From<&Experiment> for ExperimentInfo {
    fn from(e: &Experiment) -> Self {
        Self {
            id: e.id.to_string(),
            name: e.name.clone(),
            is_active: e.is_active,
            outcome: e.outcome.map(outcome_label),
            control_baseline: e.control_baseline,
            samples: e.samples.len(),
            variant_params: e.variant_params.clone(),
        }
    }
}

fn outcome_label(outcome: ExperimentOutcome) -> &'static str {
    match outcome {
        ExperimentOutcome::Adopted => "adopted",
        ExperimentOutcome::Reverted => "reverted",
        ExperimentOutcome::EarlyTerminated => "early_terminated",
        ExperimentOutcome::Failed => "failed",
    }
}

#[derive(Debug, Deserialize)]
pub struct QueueExperimentRequest {
    pub name: String,
    pub variant: TuningParams,
}

#[derive(Debug, Serialize)]
pub struct QueueExperimentResponse {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn engine_error_response(e: EngineError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        EngineError::UnknownStrategy(_) => StatusCode::NOT_FOUND,
        EngineError::Experiment(_) => StatusCode::CONFLICT,
        EngineError::Scheduler(_) => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn engine_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        engine: state.engine.status().await,
    })
}

async fn get_strategy(State(state): State<Arc<AppState>>) -> Json<StrategyResponse> {
    Json(StrategyResponse {
        active: state.engine.active_strategy().await,
        score: state.engine.active_strategy_score().await,
        catalog: state
            .engine
            .catalog()
            .iter()
            .map(|s| s.name.clone())
            .collect(),
    })
}

async fn force_strategy(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForceStrategyRequest>,
) -> Result<Json<StrategyResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!(name = %req.name, "Strategy switch requested");
    state
        .engine
        .force_strategy(&req.name)
        .await
        .map_err(engine_error_response)?;

    Ok(Json(StrategyResponse {
        active: state.engine.active_strategy().await,
        score: state.engine.active_strategy_score().await,
        catalog: state
            .engine
            .catalog()
            .iter()
            .map(|s| s.name.clone())
            .collect(),
    }))
}

async fn engine_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let m = &state.engine.metrics;
    Json(StatsResponse {
        predictions_generated: m.predictions_generated.get(),
        prefetches_completed: m.prefetches_completed.get(),
        prefetch_failures: m.prefetch_failures.get(),
        requests_admitted: m.requests_admitted.get(),
        requests_rejected: m.requests_rejected.get(),
        requests_dropped: m.requests_dropped.get(),
        items_evicted: m.items_evicted.get(),
        items_downgraded: m.items_downgraded.get(),
        current_params: state.engine.current_params().await,
    })
}

async fn engine_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthSnapshotResponse>, StatusCode> {
    // No snapshot until the first metrics cycle has run.
    let snapshot = state
        .engine
        .health()
        .await
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(HealthSnapshotResponse {
        generated_at: unix_now(),
        snapshot,
    }))
}

async fn list_experiments(State(state): State<Arc<AppState>>) -> Json<Vec<ExperimentInfo>> {
    let experiments = state.engine.experiments().await;
    Json(experiments.iter().map(ExperimentInfo::from).collect())
}

async fn queue_experiment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueueExperimentRequest>,
) -> Result<Json<QueueExperimentResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!(name = %req.name, "Experiment requested");
    let id = state
        .engine
        .queue_experiment(&req.name, req.variant)
        .await
        .map_err(engine_error_response)?;
    Ok(Json(QueueExperimentResponse { id: id.to_string() }))
}

async fn alert_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rx = state.engine.subscribe_alerts();
    Sse::new(alerts_to_sse_stream(rx)).keep_alive(KeepAlive::default())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.engine.metrics.render(),
    )
}
