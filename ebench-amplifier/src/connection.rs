//! Connection seams between the scheduler and the proxy's RPC surface.

use async_trait::async_trait;
use ebench_core::{OperationResult, WorkItem};

use crate::error::PoolError;

/// One live client connection to the proxy
#[async_trait]
pub trait ProxyConnection: Send + 'static {
    /// Dispatch one work item. Every failure is folded into the result.
    async fn execute(&mut self, item: &WorkItem) -> OperationResult;
}

/// Opens connections for the pool
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: ProxyConnection;

    /// Open connection number `index`
    async fn connect(&self, index: usize) -> Result<Self::Connection, PoolError>;
}
