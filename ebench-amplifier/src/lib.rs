//! ebench amplifier.
//!
//! Generates controlled concurrent load against the ebench storage
//! proxy: a fixed-size [`ConnectionPool`], one shared [`RateLimiter`],
//! and an [`Amplifier`] whose workers drive a request budget through
//! them and aggregate the outcomes into [`RunStats`].
//!
//! ```no_run
//! use ebench_amplifier::{Amplifier, HttpConnector, MixedWorkload};
//! use ebench_core::{AmplifyConfig, ProxyConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), ebench_amplifier::AmplifierError> {
//! let connector = HttpConnector::resolve(&ProxyConfig::default()).await?;
//! let amplifier = Amplifier::new(
//!     AmplifyConfig::default(),
//!     connector,
//!     Arc::new(MixedWorkload::default()),
//! )?;
//! let report = amplifier.run().await?;
//! report.print();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod error;
pub mod pool;
pub mod ratelimit;
pub mod scenario;
pub mod scheduler;
pub mod stats;
pub mod workload;

pub use client::{HttpConnection, HttpConnector};
pub use connection::{Connector, ProxyConnection};
pub use error::{AmplifierError, PoolError, RateLimitError};
pub use pool::{ConnectionPool, PooledConnection};
pub use ratelimit::RateLimiter;
pub use scenario::{run_seed_scenario, ScenarioReport, ScenarioStep};
pub use scheduler::Amplifier;
pub use stats::{LatencySummary, RunReport, RunStats};
pub use workload::{MixedWorkload, OperationMix, WorkGenerator};
