//! Seed scenario: one product with two SKUs, then a read back.
//!
//! Each step is logged and the scenario carries on past failures, so a
//! single run shows every broken call at once.

use ebench_core::{Domain, Operation, OperationResult, WorkItem};
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::connection::ProxyConnection;
use crate::error::AmplifierError;

const PLACEHOLDER_IMAGE: &str = "data:image/jpeg;base64,/9j/4AAQSkZJRgABAQAAAQABAAD/2wCEAAkGBxMQ";

#[derive(Debug, Clone)]
pub struct ScenarioStep {
    pub name: &'static str,
    pub result: OperationResult,
}

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub product_id: String,
    pub steps: Vec<ScenarioStep>,
}

impl ScenarioReport {
    pub fn is_ok(&self) -> bool {
        self.steps.iter().all(|s| s.result.is_ok())
    }

    /// Fail with the first failed step
    pub fn ensure_ok(&self) -> Result<(), AmplifierError> {
        match self.steps.iter().find(|s| !s.result.is_ok()) {
            Some(step) => Err(AmplifierError::Scenario {
                step: step.name,
                error: step
                    .result
                    .error
                    .clone()
                    .unwrap_or_else(|| ebench_core::OperationError::Transport("no detail".into())),
            }),
            None => Ok(()),
        }
    }

    /// The product document as read back by the last step
    pub fn fetched_product(&self) -> Option<&Value> {
        self.steps.last().and_then(|s| s.result.value.as_ref())
    }
}

pub fn product_document(id: &str) -> Value {
    json!({
        "id": id,
        "name": "mavic",
        "active": true,
        "attributes": ["drone", "dji"],
        "description": "light weight drone",
        "images": [PLACEHOLDER_IMAGE, PLACEHOLDER_IMAGE],
        "metadata": { "type": "electronic", "color": "gray" },
        "shippable": true,
        "url": "https://www.wish.com/product/dji-mavic-pro-58ddeb5f927d6d573f1350a1",
    })
}

pub fn sku_documents(product_id: &str) -> Vec<Value> {
    vec![
        json!({
            "id": Uuid::new_v4().to_string(),
            "name": "dji care",
            "currency": "USD",
            "active": true,
            "productId": product_id,
            "price": 75,
            "skuLabel": "dji care",
            "inventory": { "skuId": Uuid::new_v4().to_string(), "warehouseId": Uuid::new_v4().to_string() },
            "hasBattery": false,
            "description": "dji care insurance",
            "supplier": "dji",
        }),
        json!({
            "id": Uuid::new_v4().to_string(),
            "name": "mavic pro",
            "currency": "USD",
            "active": true,
            "productId": product_id,
            "price": 1000,
            "image": PLACEHOLDER_IMAGE,
            "skuLabel": "mavic pro",
            "packageDimensions": { "height": 5, "weight": 1029, "width": 50, "length": 100 },
            "inventory": { "skuId": Uuid::new_v4().to_string(), "warehouseId": Uuid::new_v4().to_string() },
            "attributes": { "type": "drone" },
            "hasBattery": true,
            "description": "dji mavic drone",
            "supplier": "dji",
        }),
    ]
}

/// Run the seed scenario over one connection
pub async fn run_seed_scenario<C: ProxyConnection>(connection: &mut C) -> ScenarioReport {
    let product_id = Uuid::new_v4().to_string();
    let mut steps = Vec::with_capacity(4);

    let mut plan = vec![(
        "create product",
        Operation::Create { domain: Domain::Product, document: product_document(&product_id) },
    )];
    for (name, sku) in ["upsert sku dji care", "upsert sku mavic pro"]
        .into_iter()
        .zip(sku_documents(&product_id))
    {
        plan.push((name, Operation::Upsert { domain: Domain::Sku, document: sku }));
    }
    plan.push(("get product", Operation::Get { domain: Domain::Product, id: product_id.clone() }));

    for (index, (name, operation)) in plan.into_iter().enumerate() {
        let item = WorkItem::new(index as u64, operation);
        let result = connection.execute(&item).await;
        match &result.error {
            None => info!(step = name, "Scenario step succeeded"),
            Some(e) => error!(step = name, kind = e.kind(), "Scenario step failed: {}", e),
        }
        steps.push(ScenarioStep { name, result });
    }

    ScenarioReport { product_id, steps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ebench_core::OperationError;

    /// Records operations, rejecting every upsert
    #[derive(Default)]
    struct Recorder {
        seen: Vec<Operation>,
    }

    #[async_trait]
    impl ProxyConnection for Recorder {
        async fn execute(&mut self, item: &WorkItem) -> OperationResult {
            self.seen.push(item.operation.clone());
            match item.operation {
                Operation::Upsert { .. } => OperationResult::failed(OperationError::rejected("nope")),
                _ => OperationResult::ok(Some(json!({ "name": "mavic" }))),
            }
        }
    }

    #[tokio::test]
    async fn test_scenario_runs_every_step() {
        let mut conn = Recorder::default();
        let report = run_seed_scenario(&mut conn).await;

        assert_eq!(report.steps.len(), 4);
        assert_eq!(conn.seen.len(), 4);
        assert_eq!(conn.seen[0].id(), Some(report.product_id.as_str()));
        for op in &conn.seen[1..3] {
            match op {
                Operation::Upsert { document, .. } => {
                    assert_eq!(document["productId"], report.product_id)
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(matches!(&conn.seen[3], Operation::Get { id, .. } if *id == report.product_id));

        assert!(!report.is_ok());
        match report.ensure_ok() {
            Err(AmplifierError::Scenario { step, .. }) => assert_eq!(step, "upsert sku dji care"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(report.fetched_product().unwrap()["name"], "mavic");
    }
}
