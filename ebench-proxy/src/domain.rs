//! Domain services.
//!
//! Each of the five e-commerce services (product, sku, order, payment,
//! user) translates its RPC-shaped requests into generic [`Operation`]s
//! and hands them to the one shared [`BatchCoordinator`].

use ebench_core::{Domain, Operation, OperationResult};
use serde_json::Value;
use uuid::Uuid;

use crate::batcher::BatchCoordinator;
use crate::error::ProxyError;

/// Parse the domain segment of a request path
pub fn parse_domain(name: &str) -> Result<Domain, ProxyError> {
    name.parse().map_err(|_| ProxyError::UnknownDomain(name.to_string()))
}

/// Thin adapter for one domain
#[derive(Clone)]
pub struct DomainService {
    domain: Domain,
    coordinator: BatchCoordinator,
}

impl DomainService {
    pub fn new(domain: Domain, coordinator: BatchCoordinator) -> Self {
        Self { domain, coordinator }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Create a document; an id is generated when the document has none
    pub async fn create(&self, document: Value) -> Result<OperationResult, ProxyError> {
        let operation = self.create_operation(document)?;
        Ok(self.coordinator.submit(operation).await)
    }

    pub async fn get(&self, id: String) -> Result<OperationResult, ProxyError> {
        let operation = self.get_operation(id)?;
        Ok(self.coordinator.submit(operation).await)
    }

    /// Insert or replace a document; the document must carry its id
    pub async fn upsert(&self, document: Value) -> Result<OperationResult, ProxyError> {
        let operation = self.upsert_operation(document)?;
        Ok(self.coordinator.submit(operation).await)
    }

    pub fn create_operation(&self, mut document: Value) -> Result<Operation, ProxyError> {
        let object = document
            .as_object_mut()
            .ok_or_else(|| ProxyError::InvalidRequest("document must be a JSON object".into()))?;
        match object.get("id") {
            None | Some(Value::Null) => {
                object.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
            }
            Some(Value::String(id)) if !id.is_empty() => {}
            Some(_) => {
                return Err(ProxyError::InvalidRequest("id must be a non-empty string".into()))
            }
        }
        Ok(Operation::Create { domain: self.domain, document })
    }

    pub fn get_operation(&self, id: String) -> Result<Operation, ProxyError> {
        if id.trim().is_empty() {
            return Err(ProxyError::InvalidRequest("id must not be empty".into()));
        }
        Ok(Operation::Get { domain: self.domain, id })
    }

    pub fn upsert_operation(&self, document: Value) -> Result<Operation, ProxyError> {
        let has_id = document
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| !id.is_empty());
        if !document.is_object() || !has_id {
            return Err(ProxyError::InvalidRequest(
                "upsert requires a JSON object with a string id".into(),
            ));
        }
        Ok(Operation::Upsert { domain: self.domain, document })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batcher::{BatcherConfig, CoordinatorMetrics};
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn service(domain: Domain) -> DomainService {
        let coordinator = BatchCoordinator::new(
            BatcherConfig::low_latency(),
            Arc::new(MemoryStore::new()),
            Arc::new(CoordinatorMetrics::new()),
        );
        DomainService::new(domain, coordinator)
    }

    #[test]
    fn test_parse_domain() {
        assert_eq!(parse_domain("product").unwrap(), Domain::Product);
        assert!(matches!(parse_domain("cart"), Err(ProxyError::UnknownDomain(_))));
    }

    #[test]
    fn test_create_assigns_id() {
        let op = service(Domain::Product)
            .create_operation(json!({ "name": "mavic" }))
            .unwrap();
        let id = op.id().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_create_keeps_given_id() {
        let op = service(Domain::Product)
            .create_operation(json!({ "id": "p-1" }))
            .unwrap();
        assert_eq!(op.id(), Some("p-1"));
    }

    #[test]
    fn test_create_rejects_non_object_and_bad_id() {
        let svc = service(Domain::Order);
        assert!(svc.create_operation(json!([1, 2])).is_err());
        assert!(svc.create_operation(json!({ "id": 42 })).is_err());
    }

    #[test]
    fn test_upsert_requires_id() {
        let svc = service(Domain::Sku);
        assert!(svc.upsert_operation(json!({ "name": "care" })).is_err());
        assert!(svc.upsert_operation(json!({ "id": "s-1" })).is_ok());
    }

    #[tokio::test]
    async fn test_services_share_the_store() {
        let svc = service(Domain::User);
        let created = svc.create(json!({ "id": "u-1", "name": "ada" })).await.unwrap();
        assert!(created.is_ok());

        let fetched = svc.get("u-1".to_string()).await.unwrap();
        assert_eq!(fetched.value.unwrap()["name"], "ada");
    }
}
