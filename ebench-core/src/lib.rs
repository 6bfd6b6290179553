//! ebench core library
//!
//! Value types shared by the storage proxy and the amplifier: the two
//! immutable configuration values, the operation model and the outcome
//! taxonomy every work item resolves to.

pub mod config;
pub mod error;
pub mod model;

pub use config::{
    AmplifyConfig, ProxyConfig, ReadPreference, CONCURRENCY_FACTOR, MAX_RECV_MESSAGE_BYTES,
    MAX_SEND_MESSAGE_BYTES,
};
pub use error::{ConfigError, OperationError};
pub use model::{Domain, Operation, OperationKind, OperationResult, OperationStatus, WorkItem};
