//! HTTP API: snapshot ingest, fleet queries, health checks and Prometheus metrics

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hub_lib::{
    health::{components, HealthRegistry},
    observability::{HubMetrics, StructuredLogger},
    AggregateStore, IngestError,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: AggregateStore,
    pub health_registry: HealthRegistry,
    pub metrics: HubMetrics,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        store: AggregateStore,
        health_registry: HealthRegistry,
        metrics: HubMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            store,
            health_registry,
            metrics,
            logger,
        }
    }
}

/// Body of every ingest response and of API errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

/// Errors surfaced to HTTP clients
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("failed to encode metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Ingest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownAgent(_) => StatusCode::NOT_FOUND,
            ApiError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(ApiResponse::error(self.to_string()))).into_response()
    }
}

/// Accept one snapshot from an agent
async fn update(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ApiResponse>, ApiError> {
    let start = Instant::now();

    let (snapshot, outcome) = state.store.ingest_bytes(&body).map_err(|e| {
        state.metrics.inc_ingest_rejections();
        state.logger.log_ingest_rejected(&e.to_string(), body.len());
        e
    })?;

    state
        .metrics
        .observe_ingest(start.elapsed().as_secs_f64(), outcome.history_admitted);

    if outcome.created {
        state
            .logger
            .log_agent_registered(&snapshot.agent_name, snapshot.devices.len());
    }

    debug!(
        agent = %snapshot.agent_name,
        devices = snapshot.devices.len(),
        history_admitted = outcome.history_admitted,
        "Snapshot ingested"
    );

    Ok(Json(ApiResponse::success("Data updated")))
}

/// Latest status of every agent
async fn data(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.all_status())
}

/// History of every agent
async fn history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.all_history())
}

/// History of a single agent
async fn agent_history(
    State(state): State<Arc<AppState>>,
    Path(agent): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store
        .history_of(&agent)
        .map(Json)
        .ok_or(ApiError::UnknownAgent(agent))
}

/// Fleet counters
async fn summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.summary())
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health();

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness();

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer)?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/update", post(update))
        .route("/api/data", get(data))
        .route("/api/history", get(history))
        .route("/api/history/:agent", get(agent_history))
        .route("/api/summary", get(summary))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API on an already bound listener until `shutdown` resolves
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let health = state.health_registry.clone();
    let app = create_router(state);

    info!(addr = %listener.local_addr()?, "Starting API server");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    if let Err(e) = &result {
        error!(error = %e, "API server stopped unexpectedly");
        health.set_unhealthy(components::API, e.to_string());
    }

    Ok(result?)
}
