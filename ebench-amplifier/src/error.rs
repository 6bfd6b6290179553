//! Error types for the amplifier.

use ebench_core::{ConfigError, OperationError};
use thiserror::Error;

/// Connection pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool is closed (shutdown initiated)
    #[error("connection pool closed")]
    Closed,

    /// A connection could not be established at construction
    #[error("failed to open connection {index}: {reason}")]
    Connect { index: usize, reason: String },
}

impl From<PoolError> for OperationError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Closed => OperationError::PoolClosed,
            PoolError::Connect { .. } => OperationError::Transport(err.to_string()),
        }
    }
}

/// Rate limiter errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limiter wait cancelled")]
    Cancelled,
}

/// Errors that abort a run before any work is issued
#[derive(Debug, Error)]
pub enum AmplifierError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("endpoint '{endpoint}' did not resolve: {reason}")]
    Resolve { endpoint: String, reason: String },

    #[error("latency histogram: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),

    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("scenario step '{step}' failed: {error}")]
    Scenario { step: &'static str, error: OperationError },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_maps_to_operation_error() {
        assert_eq!(OperationError::from(PoolError::Closed), OperationError::PoolClosed);
        let err = OperationError::from(PoolError::Connect { index: 2, reason: "refused".into() });
        assert_eq!(err.kind(), "transport");
    }
}
