//! Health check and metrics endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::metrics as prom;
use crate::state::AppState;

/// Health check endpoint
///
/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ping = state.store.ping().await;
    prom::set_store_healthy(ping.is_ok());

    match ping {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "store": "connected",
                "endpoint": state.config.endpoint,
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "store": "disconnected",
                "endpoint": state.config.endpoint,
                "error": e.to_string(),
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
    }
}

/// Coordinator statistics as JSON
///
/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = state.coordinator.config();

    Json(json!({
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "coordinator": {
            "config": {
                "batch_size": config.batch_size,
                "linger_ms": config.linger.as_millis() as u64,
                "rpc_timeout_ms": config.rpc_timeout.as_millis() as u64,
                "read_preference": config.read_preference.as_str(),
                "allow_partial": config.allow_partial,
                "turbo": config.turbo
            },
            "current": {
                "open_envelope": state.coordinator.pending()
            },
            "totals": state.coordinator.metrics().snapshot()
        }
    }))
}

/// Prometheus text exposition
///
/// GET /metrics/prometheus
pub async fn metrics_prometheus() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        prom::encode_metrics(),
    )
}

/// Ready check: the store must answer a ping
///
/// GET /ready
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.coordinator.is_cancelled() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match state.store.ping().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Live check
///
/// GET /live
pub async fn live() -> impl IntoResponse {
    StatusCode::OK
}
