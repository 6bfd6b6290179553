//! Operation model shared by the proxy and the amplifier.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, OperationError};

/// The five e-commerce domains served by the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Product,
    Sku,
    Order,
    Payment,
    User,
}

impl Domain {
    pub const ALL: [Domain; 5] =
        [Domain::Product, Domain::Sku, Domain::Order, Domain::Payment, Domain::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Product => "product",
            Domain::Sku => "sku",
            Domain::Order => "order",
            Domain::Payment => "payment",
            Domain::User => "user",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownDomain(s.to_string()))
    }
}

/// Kind of benchmark operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Read,
    Upsert,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Read => "read",
            OperationKind::Upsert => "upsert",
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, OperationKind::Read)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single domain operation, as consumed by the batch coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Create { domain: Domain, document: Value },
    Get { domain: Domain, id: String },
    Upsert { domain: Domain, document: Value },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create { .. } => OperationKind::Create,
            Operation::Get { .. } => OperationKind::Read,
            Operation::Upsert { .. } => OperationKind::Upsert,
        }
    }

    pub fn domain(&self) -> Domain {
        match self {
            Operation::Create { domain, .. }
            | Operation::Get { domain, .. }
            | Operation::Upsert { domain, .. } => *domain,
        }
    }

    /// The document id this operation targets, if it is already known
    pub fn id(&self) -> Option<&str> {
        match self {
            Operation::Get { id, .. } => Some(id),
            Operation::Create { document, .. } | Operation::Upsert { document, .. } => {
                document.get("id").and_then(Value::as_str)
            }
        }
    }
}

/// One unit of benchmark work, consumed exactly once
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    /// Position in the run (claimed atomically by a worker)
    pub index: u64,
    pub operation: Operation,
}

impl WorkItem {
    pub fn new(index: u64, operation: Operation) -> Self {
        Self { index, operation }
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    pub fn domain(&self) -> Domain {
        self.operation.domain()
    }
}

/// Terminal status of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Ok,
    Failed,
    TimedOut,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Ok => write!(f, "ok"),
            OperationStatus::Failed => write!(f, "failed"),
            OperationStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Outcome of one operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub status: OperationStatus,
    pub error: Option<OperationError>,
    pub value: Option<Value>,
}

impl OperationResult {
    pub fn ok(value: Option<Value>) -> Self {
        Self { status: OperationStatus::Ok, error: None, value }
    }

    /// Failure result; an amplifier-side timeout is reported as timed out
    pub fn failed(error: OperationError) -> Self {
        let status = if error.is_request_timeout() {
            OperationStatus::TimedOut
        } else {
            OperationStatus::Failed
        };
        Self { status, error: Some(error), value: None }
    }

    pub fn timed_out(after: Duration) -> Self {
        Self::failed(OperationError::RequestTimeout(after))
    }

    pub fn is_ok(&self) -> bool {
        self.status == OperationStatus::Ok
    }
}

impl From<Result<Option<Value>, OperationError>> for OperationResult {
    fn from(result: Result<Option<Value>, OperationError>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(e) => Self::failed(e),
        }
    }
}
