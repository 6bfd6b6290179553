//! Work scheduler.
//!
//! `concurrency` workers share one [`ConnectionPool`], one [`RateLimiter`]
//! and one [`RunStats`]. Each worker loops:
//!
//! ```text
//! claim index ─▶ limiter.take() ─▶ pool.acquire() ─▶ dispatch ─▶ record
//!      │                                                │
//!      └── budget exhausted or cancelled: stop          └── per_request_timeout
//! ```
//!
//! A dispatch runs in its own task that owns the pooled connection. When
//! the caller stops waiting on timeout, the call is detached rather than
//! killed, and its connection goes back to the pool once the call ends.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ebench_core::{AmplifyConfig, OperationError, OperationResult};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::connection::{Connector, ProxyConnection};
use crate::error::{AmplifierError, PoolError};
use crate::pool::ConnectionPool;
use crate::ratelimit::RateLimiter;
use crate::stats::{RunReport, RunStats};
use crate::workload::WorkGenerator;

/// Drives a benchmark run against the proxy
pub struct Amplifier<K: Connector> {
    config: AmplifyConfig,
    connector: K,
    generator: Arc<dyn WorkGenerator>,
    cancel: CancellationToken,
}

impl<K: Connector> Amplifier<K> {
    pub fn new(
        config: AmplifyConfig,
        connector: K,
        generator: Arc<dyn WorkGenerator>,
    ) -> Result<Self, AmplifierError> {
        Ok(Self {
            config: config.validated()?,
            connector,
            generator,
            cancel: CancellationToken::new(),
        })
    }

    /// Stop the run when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &AmplifyConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Open the pool and run to completion.
    ///
    /// Failing to open every connection aborts the run before any work.
    pub async fn run(&self) -> Result<RunReport, AmplifierError> {
        let pool =
            ConnectionPool::connect(&self.connector, self.config.connections, self.cancel.child_token())
                .await?;
        self.run_with_pool(pool).await
    }

    /// Run on an existing pool. The pool is closed when the run returns.
    pub async fn run_with_pool(
        &self,
        pool: Arc<ConnectionPool<K::Connection>>,
    ) -> Result<RunReport, AmplifierError> {
        let shared = Arc::new(Shared {
            per_request_timeout: self.config.per_request_timeout,
            total: self.config.total_requests,
            pool,
            limiter: RateLimiter::new(self.config.target_qps),
            generator: Arc::clone(&self.generator),
            stats: RunStats::new()?,
            claimed: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            cancel: self.cancel.clone(),
        });

        info!(
            connections = self.config.connections,
            concurrency = self.config.concurrency,
            total_requests = self.config.total_requests,
            target_qps = self.config.target_qps,
            "Starting amplifier run"
        );

        let started = Instant::now();
        let workers = TaskTracker::new();
        for worker in 0..self.config.concurrency {
            let shared = Arc::clone(&shared);
            workers.spawn(async move { shared.work(worker).await });
        }
        workers.close();
        workers.wait().await;

        let elapsed = started.elapsed();
        shared.pool.close();

        let report = shared
            .stats
            .report(elapsed, shared.max_in_flight.load(Ordering::Acquire));
        info!(
            issued = report.issued,
            succeeded = report.succeeded,
            failed = report.failed,
            timed_out = report.timed_out,
            cancelled = self.cancel.is_cancelled(),
            "Amplifier run finished"
        );
        Ok(report)
    }
}

struct Shared<C> {
    per_request_timeout: Duration,
    /// Request budget; 0 is unbounded
    total: u64,
    pool: Arc<ConnectionPool<C>>,
    limiter: RateLimiter,
    generator: Arc<dyn WorkGenerator>,
    stats: RunStats,
    claimed: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    cancel: CancellationToken,
}

impl<C: ProxyConnection> Shared<C> {
    /// Claim the next item index, or `None` once the budget is spent
    fn claim(&self) -> Option<u64> {
        if self.total == 0 {
            return Some(self.claimed.fetch_add(1, Ordering::AcqRel));
        }
        self.claimed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.total).then_some(n + 1)
            })
            .ok()
    }

    async fn work(&self, worker: usize) {
        let mut completed = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(index) = self.claim() else { break };

            if self.limiter.take(&self.cancel).await.is_err() {
                break;
            }

            let connection = match self.pool.acquire().await {
                Ok(connection) => connection,
                Err(PoolError::Closed) if self.cancel.is_cancelled() => break,
                Err(e) => {
                    self.stats.record_issued();
                    self.stats.record(&OperationResult::failed(e.into()), Duration::ZERO);
                    continue;
                }
            };

            let item = self.generator.next(index);
            self.stats.record_issued();
            let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
            self.max_in_flight.fetch_max(now, Ordering::AcqRel);

            let started = Instant::now();
            let call = tokio::spawn({
                let item = item.clone();
                async move {
                    let mut connection = connection;
                    connection.execute(&item).await
                }
            });

            let result = match tokio::time::timeout(self.per_request_timeout, call).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!(worker, index, "dispatch task failed: {}", e);
                    OperationResult::failed(OperationError::Transport(e.to_string()))
                }
                Err(_) => {
                    debug!(worker, index, "request detached after timeout");
                    OperationResult::timed_out(self.per_request_timeout)
                }
            };
            let latency = started.elapsed();

            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            self.generator.observe(&item, &result);
            self.stats.record(&result, latency);
            completed += 1;
        }
        debug!(worker, completed, "Worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ebench_core::{Domain, Operation, WorkItem};

    struct NoopConnection;

    #[async_trait]
    impl ProxyConnection for NoopConnection {
        async fn execute(&mut self, _item: &WorkItem) -> OperationResult {
            OperationResult::ok(None)
        }
    }

    struct NoopConnector;

    #[async_trait]
    impl Connector for NoopConnector {
        type Connection = NoopConnection;

        async fn connect(&self, _index: usize) -> Result<NoopConnection, PoolError> {
            Ok(NoopConnection)
        }
    }

    fn reads() -> Arc<dyn WorkGenerator> {
        Arc::new(|i: u64| WorkItem::new(i, Operation::Get { domain: Domain::Sku, id: i.to_string() }))
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AmplifyConfig { connections: 1, concurrency: 5, ..Default::default() };
        assert!(matches!(
            Amplifier::new(config, NoopConnector, reads()),
            Err(AmplifierError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_exact_budget() {
        let config = AmplifyConfig {
            connections: 2,
            concurrency: 4,
            total_requests: 250,
            ..Default::default()
        };
        let amplifier = Amplifier::new(config, NoopConnector, reads()).unwrap();
        let report = amplifier.run().await.unwrap();
        assert_eq!(report.issued, 250);
        assert_eq!(report.succeeded, 250);
        assert_eq!(report.terminal(), 250);
    }

    #[tokio::test]
    async fn test_zero_budget_with_cancel_stops() {
        let config = AmplifyConfig { total_requests: 0, ..Default::default() };
        let amplifier = Amplifier::new(config, NoopConnector, reads()).unwrap();
        let cancel = amplifier.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let report = amplifier.run().await.unwrap();
        assert!(report.issued > 0);
        assert_eq!(report.terminal(), report.issued);
    }
}
