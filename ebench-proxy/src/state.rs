//! Application state for the ebench proxy.

use std::sync::Arc;
use std::time::Instant;

use ebench_core::{Domain, ProxyConfig};

use crate::batcher::{BatchCoordinator, BatcherConfig, CoordinatorMetrics};
use crate::domain::DomainService;
use crate::store::DocumentStore;

/// Application state shared across all handlers
pub struct AppState {
    /// Shared by all five domain services
    pub coordinator: BatchCoordinator,

    /// Backing store, for health checks
    pub store: Arc<dyn DocumentStore>,

    /// Configuration
    pub config: ProxyConfig,

    pub started_at: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ProxyConfig, store: Arc<dyn DocumentStore>) -> Self {
        let coordinator = BatchCoordinator::new(
            BatcherConfig::from(&config),
            Arc::clone(&store),
            Arc::new(CoordinatorMetrics::new()),
        );
        Self { coordinator, store, config, started_at: Instant::now() }
    }

    pub fn service(&self, domain: Domain) -> DomainService {
        DomainService::new(domain, self.coordinator.clone())
    }
}
