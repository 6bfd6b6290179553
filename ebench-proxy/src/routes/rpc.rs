//! Domain RPC endpoints.
//!
//! Every domain exposes the same three calls:
//!
//! - `POST /v1/:domain` creates a document
//! - `GET /v1/:domain/:id` fetches one
//! - `PUT /v1/:domain` upserts one
//!
//! A successful call answers `200` with the store's value. A failed
//! operation answers with the status and `{"error":{"kind","message"}}`
//! body produced by [`ProxyError`].

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use ebench_core::{OperationResult, MAX_SEND_MESSAGE_BYTES};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::domain::parse_domain;
use crate::error::ProxyError;
use crate::state::AppState;

/// POST /v1/:domain
pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
    Json(document): Json<Value>,
) -> Result<Response, ProxyError> {
    let service = state.service(parse_domain(&domain)?);
    let result = service.create(document).await?;
    respond(result)
}

/// GET /v1/:domain/:id
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path((domain, id)): Path<(String, String)>,
) -> Result<Response, ProxyError> {
    let service = state.service(parse_domain(&domain)?);
    let result = service.get(id).await?;
    respond(result)
}

/// PUT /v1/:domain
pub async fn upsert(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
    Json(document): Json<Value>,
) -> Result<Response, ProxyError> {
    let service = state.service(parse_domain(&domain)?);
    let result = service.upsert(document).await?;
    respond(result)
}

fn respond(result: OperationResult) -> Result<Response, ProxyError> {
    if let Some(error) = result.error {
        debug!(kind = error.kind(), "operation failed: {}", error);
        return Err(error.into());
    }

    let body = serde_json::to_vec(&result.value.unwrap_or(Value::Null))?;
    if body.len() > MAX_SEND_MESSAGE_BYTES {
        return Err(ProxyError::ResponseTooLarge { size: body.len(), max: MAX_SEND_MESSAGE_BYTES });
    }

    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
