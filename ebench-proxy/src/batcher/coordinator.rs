//! The batch coordinator.
//!
//! Turns individual domain operations into store calls. In batched mode
//! operations accumulate into the open envelope until it is full, the
//! linger timer of its oldest operation fires, or an explicit flush is
//! requested. In turbo mode every operation is issued on its own.
//!
//! The coordinator never retries: every submitted operation resolves to
//! exactly one [`OperationResult`].
//!
//! Sealed envelopes take a ticket while the open envelope is locked. Store
//! calls begin strictly in ticket order and then run concurrently, so
//! envelopes reach the store in the order they were sealed but may resolve
//! in any order.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::Poll;
use std::time::Instant;

use ebench_core::{Operation, OperationError, OperationResult};
use futures::future::{self, join_all, Either, Ready};
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::config::BatcherConfig;
use super::envelope::{BatchEnvelope, EnvelopeState};
use super::metrics::CoordinatorMetrics;
use crate::metrics as prom;
use crate::store::{DocumentStore, ItemError, StoreError, StoreRequest};

/// Batching and consistency layer in front of the document store
#[derive(Clone)]
pub struct BatchCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: BatcherConfig,
    store: Arc<dyn DocumentStore>,
    metrics: Arc<CoordinatorMetrics>,
    /// The single open envelope; never held across an await
    open: Mutex<Option<BatchEnvelope>>,
    next_envelope: AtomicU64,
    /// Seal order; only taken while `open` is locked
    next_ticket: AtomicU64,
    /// Ticket whose store call may begin next
    turn: watch::Sender<u64>,
    /// Flush tasks and linger timers
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl BatchCoordinator {
    pub fn new(
        config: BatcherConfig,
        store: Arc<dyn DocumentStore>,
        metrics: Arc<CoordinatorMetrics>,
    ) -> Self {
        info!(
            batch_size = config.batch_size,
            linger_ms = config.linger.as_millis() as u64,
            rpc_timeout_ms = config.rpc_timeout.as_millis() as u64,
            read_preference = %config.read_preference,
            allow_partial = config.allow_partial,
            turbo = config.turbo,
            "Creating batch coordinator"
        );
        let (turn, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                metrics,
                open: Mutex::new(None),
                next_envelope: AtomicU64::new(1),
                next_ticket: AtomicU64::new(0),
                turn,
                tasks: TaskTracker::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &Arc<CoordinatorMetrics> {
        &self.inner.metrics
    }

    /// Number of operations waiting in the open envelope
    pub fn pending(&self) -> usize {
        self.inner.open.lock().as_ref().map_or(0, BatchEnvelope::len)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Resolve one operation
    pub async fn submit(&self, operation: Operation) -> OperationResult {
        let mut results = self.submit_many(vec![operation]).await;
        results
            .pop()
            .unwrap_or_else(|| OperationResult::failed(OperationError::Cancelled))
    }

    /// Resolve several operations; results are aligned with the input.
    ///
    /// In batched mode the operations enter envelopes contiguously and in
    /// order.
    pub async fn submit_many(&self, operations: Vec<Operation>) -> Vec<OperationResult> {
        let inner = &self.inner;
        let requests: Vec<StoreRequest> = operations
            .into_iter()
            .map(|operation| {
                inner.metrics.record_submitted();
                StoreRequest::new(operation, inner.config.read_preference)
            })
            .collect();

        if inner.config.turbo {
            return join_all(requests.into_iter().map(|r| inner.dispatch_single(r))).await;
        }

        let receivers = inner.enqueue(requests);
        join_all(receivers.into_iter().map(|rx| async move {
            rx.await
                .unwrap_or_else(|_| OperationResult::failed(OperationError::Cancelled))
        }))
        .await
    }

    /// Flush the open envelope now and wait for its results to be distributed
    pub async fn flush(&self) {
        if let Some((ticket, envelope)) = self.inner.take_open(None) {
            // Run in a tracked task so an abandoned caller cannot stall the
            // tickets behind this one.
            let _ = self.inner.spawn_flush(ticket, envelope).await;
        }
    }

    /// Flush what is pending, wait for every in-flight flush, then stop
    /// accepting work
    pub async fn shutdown(&self) {
        info!(pending = self.pending(), "Shutting down batch coordinator");
        self.flush().await;
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.cancel.cancel();
    }

    /// Abandon in-flight flushes; pending operations resolve as cancelled
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    fn enqueue(self: &Arc<Self>, requests: Vec<StoreRequest>) -> Vec<oneshot::Receiver<OperationResult>> {
        let mut receivers = Vec::with_capacity(requests.len());

        if self.cancel.is_cancelled() {
            for _ in requests {
                let (tx, rx) = oneshot::channel();
                let _ = tx.send(OperationResult::failed(OperationError::Cancelled));
                receivers.push(rx);
            }
            return receivers;
        }

        let count = requests.len() as u64;
        let mut sealed = Vec::new();
        let mut opened = Vec::new();
        {
            let mut open = self.open.lock();
            // Counted before any of these operations can be flushed
            self.metrics.record_pending(count);
            for request in requests {
                let envelope = open.get_or_insert_with(|| {
                    let id = self.next_envelope.fetch_add(1, Ordering::Relaxed);
                    opened.push(id);
                    BatchEnvelope::new(id, self.config.batch_size)
                });
                let (tx, rx) = oneshot::channel();
                envelope.push(request, tx);
                receivers.push(rx);

                if envelope.is_full() {
                    if let Some(full) = open.take() {
                        sealed.push((self.next_ticket(), full));
                    }
                }
            }
        }

        for (ticket, envelope) in sealed {
            self.spawn_flush(ticket, envelope);
        }
        for id in opened {
            self.spawn_linger(id);
        }
        receivers
    }

    /// Caller holds the `open` lock
    fn next_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::Relaxed)
    }

    /// Take and ticket the open envelope, optionally only if it is
    /// envelope `expected`
    fn take_open(&self, expected: Option<u64>) -> Option<(u64, BatchEnvelope)> {
        let mut open = self.open.lock();
        let matches = open
            .as_ref()
            .is_some_and(|envelope| expected.map_or(true, |id| envelope.id() == id));
        if !matches {
            return None;
        }
        open.take().map(|envelope| (self.next_ticket(), envelope))
    }

    fn spawn_flush(self: &Arc<Self>, ticket: u64, envelope: BatchEnvelope) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        self.tasks.spawn(async move { inner.flush(ticket, envelope).await })
    }

    /// Wait for `ticket`'s turn, then poll `call` once so that it reaches
    /// the store before any later ticket does. `None` if cancelled first.
    async fn start_in_turn<F>(&self, ticket: u64, mut call: F) -> Option<Either<Ready<F::Output>, F>>
    where
        F: Future + Unpin,
    {
        let mut turn = self.turn.subscribe();
        let _ = turn.wait_for(|next| *next == ticket).await;

        let started = if self.cancel.is_cancelled() {
            None
        } else {
            Some(match futures::poll!(&mut call) {
                Poll::Ready(output) => Either::Left(future::ready(output)),
                Poll::Pending => Either::Right(call),
            })
        };
        self.turn.send_modify(|next| *next += 1);
        started
    }

    fn spawn_linger(self: &Arc<Self>, id: u64) {
        let inner = Arc::clone(self);
        self.tasks.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(inner.config.linger) => {}
                _ = inner.cancel.cancelled() => {}
            }
            if let Some((ticket, envelope)) = inner.take_open(Some(id)) {
                debug!(envelope = id, size = envelope.len(), "Linger expired");
                inner.flush(ticket, envelope).await;
            }
        });
    }

    async fn flush(&self, ticket: u64, envelope: BatchEnvelope) {
        let size = envelope.len();
        let (requests, pending) = envelope.seal();
        let labels: Vec<_> = requests
            .iter()
            .map(|r| (r.operation.domain(), r.operation.kind()))
            .collect();
        let rpc_timeout = self.config.rpc_timeout;

        debug!(envelope = pending.id(), ticket, size, "Flushing envelope");
        let started = Instant::now();
        let call = Box::pin(tokio::time::timeout(rpc_timeout, self.store.execute_batch(requests)));
        let outcome = match self.start_in_turn(ticket, call).await {
            None => Err(OperationError::Cancelled),
            Some(call) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(OperationError::Cancelled),
                result = call => match result {
                    Ok(Ok(items)) => Ok(items),
                    Ok(Err(StoreError::Unavailable(msg))) => Err(OperationError::unavailable(msg)),
                    Err(_) => {
                        self.metrics.record_flush_timeout();
                        Err(OperationError::BatchTimeout(rpc_timeout))
                    }
                },
            },
        };
        let elapsed = started.elapsed();
        let waited = pending.waited();
        let envelope_id = pending.id();

        let (state, results) = pending.resolve(outcome, self.config.allow_partial);
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        self.metrics.record_flush(size, state, succeeded, elapsed);

        prom::record_flush(size, elapsed);
        for ((domain, kind), result) in labels.iter().zip(&results) {
            prom::record_operation(*domain, *kind, result.status, waited);
        }

        if state == EnvelopeState::Failed {
            let cause = results.first().and_then(|r| r.error.as_ref());
            if let Some(cause) = cause {
                prom::record_envelope_failed(cause.kind());
            }
            warn!(
                envelope = envelope_id,
                size,
                cause = ?cause,
                "Envelope failed"
            );
        } else {
            debug!(
                envelope = envelope_id,
                size,
                succeeded,
                store_ms = elapsed.as_millis() as u64,
                "Envelope resolved"
            );
        }
    }

    async fn dispatch_single(&self, request: StoreRequest) -> OperationResult {
        let domain = request.operation.domain();
        let kind = request.operation.kind();
        let rpc_timeout = self.config.rpc_timeout;
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => OperationResult::failed(OperationError::Cancelled),
            result = tokio::time::timeout(rpc_timeout, self.store.execute(request)) => match result {
                Ok(Ok(item)) => item_result(item),
                Ok(Err(StoreError::Unavailable(msg))) => {
                    OperationResult::failed(OperationError::unavailable(msg))
                }
                Err(_) => OperationResult::failed(OperationError::BatchTimeout(rpc_timeout)),
            },
        };

        let elapsed = started.elapsed();
        self.metrics.record_turbo(result.is_ok(), elapsed);
        prom::record_operation(domain, kind, result.status, elapsed);
        result
    }
}

fn item_result(item: Result<Option<serde_json::Value>, ItemError>) -> OperationResult {
    match item {
        Ok(value) => OperationResult::ok(value),
        Err(e) => OperationResult::failed(OperationError::rejected(e.to_string())),
    }
}
