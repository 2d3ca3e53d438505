// Exporter HTTP request handlers
use crate::application::ingest_service::CycleState;
use crate::application::metric_store::SeriesRecord;
use crate::presentation::app_state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const METRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub plugins: Vec<String>,
    pub last_cycle: CycleState,
    pub series: Vec<SeriesRecord>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint with the known series catalog
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let last_cycle = state.orchestrator.state();
    let status = match last_cycle {
        CycleState::Failed => "degraded",
        _ => "ok",
    };

    Json(HealthResponse {
        status,
        plugins: state.orchestrator.plugin_names(),
        last_cycle,
        series: state.data_layer.get_metrics().await,
    })
}

/// Prometheus scrape endpoint
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
