//! Metrics module for the ebench proxy
//!
//! Provides Prometheus metrics for monitoring and observability.

pub mod prometheus;

// Re-export commonly used items
pub use prometheus::{
    encode_metrics, record_envelope_failed, record_flush, record_operation, register_metrics,
    set_store_healthy, OPERATIONS_TOTAL,
};
