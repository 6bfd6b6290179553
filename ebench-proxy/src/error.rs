//! Error types for the ebench proxy.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ebench_core::OperationError;
use serde_json::json;

/// Proxy error types
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Path names a domain the proxy does not serve
    #[error("unknown domain '{0}'")]
    UnknownDomain(String),

    /// Request body is not a usable document
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The operation resolved to a failure
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// Outbound document exceeds the send limit
    #[error("response of {size} bytes exceeds the {max} byte limit")]
    ResponseTooLarge { size: usize, max: usize },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProxyError {
    /// Machine-readable kind, shared with [`OperationError::kind`]
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::UnknownDomain(_) => "unknown_domain",
            // A malformed document is a payload rejection as far as callers care.
            ProxyError::InvalidRequest(_) => "operation_rejected",
            ProxyError::Operation(e) => e.kind(),
            ProxyError::ResponseTooLarge { .. } => "response_too_large",
            ProxyError::Serialization(_) => "internal",
        }
    }

    /// Message for the error body; operation errors carry only their detail
    pub fn message(&self) -> String {
        match self {
            ProxyError::Operation(e) => e.detail(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::UnknownDomain(_) => StatusCode::NOT_FOUND,
            ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::Operation(e) => match e {
                OperationError::OperationRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
                OperationError::StoreUnavailable(_)
                | OperationError::PoolClosed
                | OperationError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                OperationError::BatchTimeout(_) | OperationError::RequestTimeout(_) => {
                    StatusCode::GATEWAY_TIMEOUT
                }
                OperationError::Transport(_) => StatusCode::BAD_GATEWAY,
            },
            ProxyError::ResponseTooLarge { .. } | ProxyError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "kind": self.kind(),
                "message": self.message(),
            }
        }));

        (self.status(), body).into_response()
    }
}
