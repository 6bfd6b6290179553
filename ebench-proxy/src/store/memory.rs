//! In-process document store.
//!
//! Items of a batch are applied in order and independently: a rejected
//! item does not undo the ones applied before it. Requests are applied as
//! soon as they are received; the configured latency only delays the reply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ebench_core::{Domain, Operation, ReadPreference};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use super::{DocumentStore, ItemError, ItemResult, StoreError, StoreRequest};

#[derive(Debug)]
pub struct MemoryStore {
    documents: RwLock<HashMap<(Domain, String), Value>>,
    /// Cleared to simulate an unreachable store
    available: AtomicBool,
    /// Artificial reply latency in microseconds
    latency_us: AtomicU64,
    reads_by_preference: Mutex<HashMap<ReadPreference, u64>>,
    calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            latency_us: AtomicU64::new(0),
            reads_by_preference: Mutex::new(HashMap::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Create a store that answers every call after `latency`
    pub fn with_latency(latency: Duration) -> Self {
        let store = Self::new();
        store.set_latency(latency);
        store
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_us.store(latency.as_micros() as u64, Ordering::Relaxed);
    }

    /// Number of store calls (batch or single) received
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Number of reads issued with the given preference
    pub fn reads_with(&self, preference: ReadPreference) -> u64 {
        self.reads_by_preference.lock().get(&preference).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, domain: Domain, id: &str) -> Option<Value> {
        self.documents.read().get(&(domain, id.to_string())).cloned()
    }

    fn apply(&self, request: StoreRequest) -> ItemResult {
        match request.operation {
            Operation::Create { domain, document } => {
                let id = document_id(&document)?;
                let mut documents = self.documents.write();
                let key = (domain, id.clone());
                if documents.contains_key(&key) {
                    return Err(ItemError::DuplicateKey { domain, id });
                }
                documents.insert(key, document);
                Ok(Some(json!({ "id": id })))
            }
            Operation::Upsert { domain, document } => {
                let id = document_id(&document)?;
                self.documents.write().insert((domain, id.clone()), document);
                Ok(Some(json!({ "id": id })))
            }
            Operation::Get { domain, id } => {
                if let Some(preference) = request.read_preference {
                    *self.reads_by_preference.lock().entry(preference).or_insert(0) += 1;
                }
                self.documents
                    .read()
                    .get(&(domain, id.clone()))
                    .cloned()
                    .map(Some)
                    .ok_or(ItemError::NotFound { domain, id })
            }
        }
    }

    /// Count an incoming call; `false` when the store is marked down
    fn receive(&self) -> bool {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.available.load(Ordering::SeqCst)
    }

    async fn reply<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        let latency = self.latency_us.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_micros(latency)).await;
        }
        result
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn document_id(document: &Value) -> Result<String, ItemError> {
    let object = document
        .as_object()
        .ok_or_else(|| ItemError::Invalid("document must be a JSON object".to_string()))?;
    object
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ItemError::Invalid("document has no string id".to_string()))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    #[instrument(skip(self, requests), fields(items = requests.len()))]
    async fn execute_batch(&self, requests: Vec<StoreRequest>) -> Result<Vec<ItemResult>, StoreError> {
        if !self.receive() {
            return self.reply(Err(unavailable())).await;
        }
        let results: Vec<ItemResult> = requests.into_iter().map(|r| self.apply(r)).collect();
        debug!(
            rejected = results.iter().filter(|r| r.is_err()).count(),
            "Batch applied"
        );
        self.reply(Ok(results)).await
    }

    async fn execute(&self, request: StoreRequest) -> Result<ItemResult, StoreError> {
        if !self.receive() {
            return self.reply(Err(unavailable())).await;
        }
        let result = self.apply(request);
        self.reply(Ok(result)).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(unavailable())
        }
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable("memory store marked unavailable".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn create(domain: Domain, id: &str) -> StoreRequest {
        StoreRequest::new(
            Operation::Create { domain, document: json!({ "id": id, "name": id }) },
            ReadPreference::Primary,
        )
    }

    fn get(domain: Domain, id: &str, pref: ReadPreference) -> StoreRequest {
        StoreRequest::new(Operation::Get { domain, id: id.to_string() }, pref)
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = MemoryStore::new();
        let created = store.execute(create(Domain::Product, "p-1")).await.unwrap();
        assert_eq!(created, Ok(Some(json!({ "id": "p-1" }))));

        let fetched = store
            .execute(get(Domain::Product, "p-1", ReadPreference::Secondary))
            .await
            .unwrap();
        assert_eq!(fetched.unwrap().unwrap()["name"], "p-1");
        assert_eq!(store.reads_with(ReadPreference::Secondary), 1);
        assert_eq!(store.reads_with(ReadPreference::Primary), 0);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = MemoryStore::new();
        store.execute(create(Domain::Sku, "s-1")).await.unwrap().unwrap();
        let again = store.execute(create(Domain::Sku, "s-1")).await.unwrap();
        assert!(matches!(again, Err(ItemError::DuplicateKey { .. })));
    }

    #[tokio::test]
    async fn test_same_id_in_different_domains() {
        let store = MemoryStore::new();
        store.execute(create(Domain::Sku, "x")).await.unwrap().unwrap();
        store.execute(create(Domain::Order, "x")).await.unwrap().unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_applies_items_independently() {
        let store = MemoryStore::new();
        let results = store
            .execute_batch(vec![
                create(Domain::User, "a"),
                create(Domain::User, "a"),
                create(Domain::User, "b"),
            ])
            .await
            .unwrap();

        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
        assert!(store.get(Domain::User, "b").is_some());
    }

    #[tokio::test]
    async fn test_missing_id_is_invalid() {
        let store = MemoryStore::new();
        let request = StoreRequest::new(
            Operation::Upsert { domain: Domain::Order, document: json!({ "total": 3 }) },
            ReadPreference::Primary,
        );
        assert!(matches!(store.execute(request).await.unwrap(), Err(ItemError::Invalid(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_applied_before_slow_reply() {
        let store = Arc::new(MemoryStore::with_latency(Duration::from_secs(5)));
        let call = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.execute(create(Domain::Sku, "s-1")).await })
        };
        while store.calls() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(store.get(Domain::Sku, "s-1").is_some());
        assert!(!call.is_finished());
        assert!(call.await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_whole_batch() {
        let store = MemoryStore::new();
        store.set_available(false);
        let result = store.execute_batch(vec![create(Domain::Payment, "p")]).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(store.ping().await.is_err());
        assert!(store.is_empty());
    }
}
