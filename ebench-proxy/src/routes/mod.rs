//! HTTP route handlers for the ebench proxy.
//!
//! - `health`: health checks and metrics endpoints
//! - `rpc`: create/get/upsert for the five domain services

pub mod health;
pub mod rpc;

pub use health::{health, live, metrics, metrics_prometheus, ready};
pub use rpc::{create, get, upsert};
