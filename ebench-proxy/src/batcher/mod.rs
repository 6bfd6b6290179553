//! Operation batching between the domain handlers and the document store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Domain handlers (product, sku, order, ...)     │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │ Operation
//!                    ┌────────▼────────┐
//!                    │ BatchCoordinator│ ← turbo: straight through
//!                    │  ┌───────────┐  │
//!                    │  │ envelope  │  │ ← Open until batch_size
//!                    │  └───────────┘  │   or linger expires
//!                    └────────┬────────┘
//!                             │ Vec<StoreRequest> (+ readPreference on reads)
//!                    ┌────────▼────────┐
//!                    │  DocumentStore  │ ← bounded by rpc_timeout
//!                    └─────────────────┘
//! ```
//!
//! # Failure policy
//!
//! - `allow_partial = true`: every item gets the store's verdict for it.
//! - `allow_partial = false`: one rejected item fails the envelope; every
//!   item reports that item's cause. Nothing is rolled back.
//! - Store unreachable, rpc timeout or cancellation fail every pending item
//!   of the envelope regardless of policy.

mod config;
mod coordinator;
mod envelope;
mod metrics;

pub use config::BatcherConfig;
pub use coordinator::BatchCoordinator;
pub use envelope::{apply_policy, BatchEnvelope, EnvelopeState, PendingResults};
pub use metrics::{CoordinatorMetrics, MetricsSnapshot};
