//! Backing document store abstraction.
//!
//! The batch coordinator talks to the store through [`DocumentStore`].
//! A batch call either fails as a whole ([`StoreError`], no per-item
//! information exists) or returns one [`ItemResult`] per request, in
//! submission order.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use ebench_core::{Domain, Operation, ReadPreference};
use serde_json::Value;

/// One operation as issued to the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRequest {
    pub operation: Operation,
    /// Present on reads only
    pub read_preference: Option<ReadPreference>,
}

impl StoreRequest {
    /// Attach `read_preference` to reads; writes never carry one
    pub fn new(operation: Operation, read_preference: ReadPreference) -> Self {
        let read_preference = operation.kind().is_read().then_some(read_preference);
        Self { operation, read_preference }
    }
}

/// Batch-level store failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),
}

/// Per-item rejection reported by the store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemError {
    #[error("duplicate key {domain}/{id}")]
    DuplicateKey { domain: Domain, id: String },

    #[error("document {domain}/{id} not found")]
    NotFound { domain: Domain, id: String },

    #[error("invalid document: {0}")]
    Invalid(String),
}

/// Outcome of one item within a store call
pub type ItemResult = Result<Option<Value>, ItemError>;

/// Backing document store.
///
/// A call reaches the store on the first poll of its future: implementations
/// send (or apply) the request before their first suspension point, so
/// calls started in order arrive in order.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Issue a batch as one logical unit
    async fn execute_batch(&self, requests: Vec<StoreRequest>) -> Result<Vec<ItemResult>, StoreError>;

    /// Issue a single operation (turbo mode)
    async fn execute(&self, request: StoreRequest) -> Result<ItemResult, StoreError> {
        let mut results = self.execute_batch(vec![request]).await?;
        results
            .pop()
            .ok_or_else(|| StoreError::Unavailable("store returned no result".to_string()))
    }

    /// Cheap reachability check
    async fn ping(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_preference_only_on_reads() {
        let get = StoreRequest::new(
            Operation::Get { domain: Domain::Product, id: "p".to_string() },
            ReadPreference::Nearest,
        );
        assert_eq!(get.read_preference, Some(ReadPreference::Nearest));

        let upsert = StoreRequest::new(
            Operation::Upsert { domain: Domain::Product, document: json!({"id": "p"}) },
            ReadPreference::Nearest,
        );
        assert_eq!(upsert.read_preference, None);
    }
}
