//! Error types for the ebench core library
//!
//! # Error Hierarchy
//!
//! ```text
//! ConfigError     - rejected configuration, raised once at construction
//! OperationError  - terminal failure of a single operation
//! ├── PoolClosed         - no connection could be acquired (shutdown)
//! ├── StoreUnavailable   - transport-level store failure, whole envelope
//! ├── OperationRejected  - store refused the payload
//! ├── BatchTimeout       - store did not answer within rpc_timeout
//! ├── RequestTimeout     - amplifier gave up after per_request_timeout
//! ├── Cancelled          - flush abandoned on shutdown
//! └── Transport          - amplifier could not talk to the proxy
//! ```

use std::time::Duration;

use thiserror::Error;

/// Errors raised while validating configuration values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: u64,
        value: u64,
    },

    #[error("concurrency {concurrency} exceeds connections ({connections}) x {factor}")]
    ConcurrencyTooHigh {
        concurrency: usize,
        connections: usize,
        factor: usize,
    },

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("unknown read preference '{0}'")]
    UnknownReadPreference(String),

    #[error("unknown domain '{0}'")]
    UnknownDomain(String),

    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),
}

/// Terminal failure of one operation.
///
/// Cloneable so that an all-or-nothing batch can hand the same cause to
/// every item of the envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("connection pool closed")]
    PoolClosed,

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("operation rejected: {0}")]
    OperationRejected(String),

    #[error("store did not respond within {0:?}")]
    BatchTimeout(Duration),

    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),
}

impl OperationError {
    /// Create a store unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a rejection error
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::OperationRejected(msg.into())
    }

    /// Stable machine-readable name, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PoolClosed => "pool_closed",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::OperationRejected(_) => "operation_rejected",
            Self::BatchTimeout(_) => "batch_timeout",
            Self::RequestTimeout(_) => "request_timeout",
            Self::Cancelled => "cancelled",
            Self::Transport(_) => "transport",
        }
    }

    /// Message carried on the wire next to [`kind`](Self::kind), such that
    /// `from_wire(kind, detail)` rebuilds an equal error (durations aside).
    pub fn detail(&self) -> String {
        match self {
            Self::StoreUnavailable(msg) | Self::OperationRejected(msg) | Self::Transport(msg) => {
                msg.clone()
            }
            other => other.to_string(),
        }
    }

    /// Rebuild an error from its wire `kind` and message.
    ///
    /// Durations are not carried on the wire, so timeouts come back with
    /// a zero duration.
    pub fn from_wire(kind: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            "pool_closed" => Self::PoolClosed,
            "store_unavailable" => Self::StoreUnavailable(message),
            "operation_rejected" => Self::OperationRejected(message),
            "batch_timeout" => Self::BatchTimeout(Duration::ZERO),
            "request_timeout" => Self::RequestTimeout(Duration::ZERO),
            "cancelled" => Self::Cancelled,
            _ => Self::Transport(message),
        }
    }

    /// True for the amplifier-side timeout, which is counted separately
    /// from failures.
    pub fn is_request_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::TooSmall { field: "batch_size", min: 1, value: 0 };
        assert_eq!(err.to_string(), "batch_size must be at least 1, got 0");

        let err = ConfigError::ConcurrencyTooHigh { concurrency: 50, connections: 2, factor: 4 };
        assert_eq!(err.to_string(), "concurrency 50 exceeds connections (2) x 4");
    }

    #[test]
    fn test_wire_kind_round_trip() {
        let errors = [
            OperationError::PoolClosed,
            OperationError::unavailable("down"),
            OperationError::rejected("duplicate key"),
            OperationError::Cancelled,
        ];
        for err in errors {
            let back = OperationError::from_wire(err.kind(), err.detail());
            assert_eq!(back, err);
        }
    }

    #[test]
    fn test_unknown_wire_kind_is_transport() {
        let err = OperationError::from_wire("bogus", "boom");
        assert_eq!(err, OperationError::Transport("boom".to_string()));
    }

    #[test]
    fn test_request_timeout_flag() {
        assert!(OperationError::RequestTimeout(Duration::from_secs(1)).is_request_timeout());
        assert!(!OperationError::BatchTimeout(Duration::from_secs(1)).is_request_timeout());
    }
}
