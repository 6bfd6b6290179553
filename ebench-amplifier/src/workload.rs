//! Work item generators.

use std::collections::HashMap;

use ebench_core::{Domain, Operation, OperationKind, OperationResult, WorkItem};
use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

/// Produces the work item for each claimed index
pub trait WorkGenerator: Send + Sync {
    fn next(&self, index: u64) -> WorkItem;

    /// Called with the terminal result of every completed item
    fn observe(&self, _item: &WorkItem, _result: &OperationResult) {}
}

impl<F> WorkGenerator for F
where
    F: Fn(u64) -> WorkItem + Send + Sync,
{
    fn next(&self, index: u64) -> WorkItem {
        self(index)
    }
}

/// Relative weights of each operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationMix {
    pub create: u32,
    pub read: u32,
    pub upsert: u32,
}

impl Default for OperationMix {
    fn default() -> Self {
        Self { create: 2, read: 6, upsert: 2 }
    }
}

impl OperationMix {
    pub fn total(&self) -> u32 {
        self.create + self.read + self.upsert
    }

    /// Weighted round-robin: slot `n` of every `total()` consecutive slots
    pub fn kind_at(&self, n: u64) -> OperationKind {
        let total = self.total().max(1) as u64;
        let slot = (n % total) as u32;
        if slot < self.create {
            OperationKind::Create
        } else if slot < self.create + self.read {
            OperationKind::Read
        } else if slot < self.total() {
            OperationKind::Upsert
        } else {
            OperationKind::Create
        }
    }
}

/// Deterministic mixed workload over the e-commerce domains.
///
/// Domains rotate per item; the operation kind follows the weighted mix.
/// Reads and upserts target documents this run created successfully and
/// fall back to a create while none exist for that domain.
pub struct MixedWorkload {
    run_id: String,
    domains: Vec<Domain>,
    mix: OperationMix,
    payload_bytes: usize,
    created: Mutex<HashMap<Domain, Vec<String>>>,
}

impl MixedWorkload {
    pub fn new(domains: Vec<Domain>, mix: OperationMix, payload_bytes: usize) -> Self {
        let domains = if domains.is_empty() { Domain::ALL.to_vec() } else { domains };
        let run_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self { run_id, domains, mix, payload_bytes, created: Mutex::new(HashMap::new()) }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn created(&self, domain: Domain) -> usize {
        self.created.lock().get(&domain).map_or(0, Vec::len)
    }

    fn known_id(&self, domain: Domain, index: u64) -> Option<String> {
        let created = self.created.lock();
        let ids = created.get(&domain).filter(|ids| !ids.is_empty())?;
        Some(ids[(index as usize) % ids.len()].clone())
    }

    fn document(&self, domain: Domain, id: &str, index: u64) -> Value {
        let mut doc = sample_document(domain, id, index);
        if self.payload_bytes > 0 {
            doc["blob"] = Value::String("x".repeat(self.payload_bytes));
        }
        doc
    }
}

impl Default for MixedWorkload {
    fn default() -> Self {
        Self::new(Domain::ALL.to_vec(), OperationMix::default(), 0)
    }
}

impl WorkGenerator for MixedWorkload {
    fn next(&self, index: u64) -> WorkItem {
        let n = self.domains.len() as u64;
        let domain = self.domains[(index % n) as usize];
        let kind = self.mix.kind_at(index / n);

        let operation = match kind {
            OperationKind::Read => match self.known_id(domain, index) {
                Some(id) => Operation::Get { domain, id },
                None => self.create(domain, index),
            },
            OperationKind::Upsert => match self.known_id(domain, index) {
                Some(id) => Operation::Upsert { domain, document: self.document(domain, &id, index) },
                None => self.create(domain, index),
            },
            OperationKind::Create => self.create(domain, index),
        };
        WorkItem::new(index, operation)
    }

    fn observe(&self, item: &WorkItem, result: &OperationResult) {
        if !result.is_ok() || item.kind() != OperationKind::Create {
            return;
        }
        if let Some(id) = item.operation.id() {
            self.created.lock().entry(item.domain()).or_default().push(id.to_string());
        }
    }
}

impl MixedWorkload {
    fn create(&self, domain: Domain, index: u64) -> Operation {
        let id = format!("{}-{}-{}", self.run_id, domain, index);
        Operation::Create { domain, document: self.document(domain, &id, index) }
    }
}

/// A plausible document for each domain
pub fn sample_document(domain: Domain, id: &str, index: u64) -> Value {
    match domain {
        Domain::Product => json!({
            "id": id,
            "name": format!("product {}", index),
            "active": true,
            "attributes": ["drone", "dji"],
            "metadata": { "type": "drone", "color": "grey" },
            "shippable": true,
        }),
        Domain::Sku => json!({
            "id": id,
            "name": format!("sku {}", index),
            "price": 100 + (index % 900),
            "currency": "USD",
            "inventory": { "type": "finite", "quantity": 500 },
        }),
        Domain::Order => json!({
            "id": id,
            "status": "created",
            "items": [{ "sku": format!("sku-{}", index % 17), "quantity": 1 + index % 3 }],
            "total": 100 + (index % 900),
        }),
        Domain::Payment => json!({
            "id": id,
            "amount": 100 + (index % 900),
            "currency": "USD",
            "method": "card",
        }),
        Domain::User => json!({
            "id": id,
            "name": format!("user {}", index),
            "email": format!("user{}@example.com", index),
        }),
    }
}
