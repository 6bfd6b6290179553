//! Metrics for the batch coordinator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::envelope::EnvelopeState;

/// Counters for monitoring coordinator behaviour
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    /// Operations accepted by `submit`
    pub operations_submitted: AtomicU64,

    /// Operations that resolved successfully
    pub operations_succeeded: AtomicU64,

    /// Operations that resolved as failures
    pub operations_failed: AtomicU64,

    /// Operations sitting in the open envelope
    pub operations_pending: AtomicU64,

    /// Operations issued individually in turbo mode
    pub turbo_calls: AtomicU64,

    /// Envelopes flushed to the store
    pub flushes: AtomicU64,

    /// Envelopes that ended in the Failed state
    pub envelopes_failed: AtomicU64,

    /// Flushes that hit rpc_timeout
    pub flush_timeouts: AtomicU64,

    /// Sum of envelope sizes (for averaging)
    pub total_batched_operations: AtomicU64,

    /// Sum of store call durations in microseconds (for averaging)
    pub total_store_us: AtomicU64,

    /// Largest envelope flushed
    pub max_batch_size: AtomicU64,
}

impl CoordinatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.operations_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pending(&self, count: u64) {
        self.operations_pending.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_turbo(&self, ok: bool, elapsed: Duration) {
        self.turbo_calls.fetch_add(1, Ordering::Relaxed);
        self.total_store_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.record_outcome(ok);
    }

    /// Record a finished flush and its per-item outcomes
    pub fn record_flush(&self, size: usize, state: EnvelopeState, succeeded: usize, elapsed: Duration) {
        let size_u64 = size as u64;
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.operations_pending.fetch_sub(size_u64, Ordering::Relaxed);
        self.total_batched_operations
            .fetch_add(size_u64, Ordering::Relaxed);
        self.total_store_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.max_batch_size.fetch_max(size_u64, Ordering::Relaxed);
        if state == EnvelopeState::Failed {
            self.envelopes_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.operations_succeeded
            .fetch_add(succeeded as u64, Ordering::Relaxed);
        self.operations_failed
            .fetch_add((size - succeeded.min(size)) as u64, Ordering::Relaxed);
    }

    pub fn record_flush_timeout(&self) {
        self.flush_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    fn record_outcome(&self, ok: bool) {
        if ok {
            self.operations_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.operations_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Calculate average envelope size
    pub fn avg_batch_size(&self) -> f64 {
        let flushes = self.flushes.load(Ordering::Relaxed);
        if flushes == 0 {
            return 0.0;
        }
        self.total_batched_operations.load(Ordering::Relaxed) as f64 / flushes as f64
    }

    /// Calculate average store call time in milliseconds
    pub fn avg_store_ms(&self) -> f64 {
        let calls = self.flushes.load(Ordering::Relaxed) + self.turbo_calls.load(Ordering::Relaxed);
        if calls == 0 {
            return 0.0;
        }
        self.total_store_us.load(Ordering::Relaxed) as f64 / calls as f64 / 1000.0
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations_submitted: self.operations_submitted.load(Ordering::Relaxed),
            operations_succeeded: self.operations_succeeded.load(Ordering::Relaxed),
            operations_failed: self.operations_failed.load(Ordering::Relaxed),
            operations_pending: self.operations_pending.load(Ordering::Relaxed),
            turbo_calls: self.turbo_calls.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            envelopes_failed: self.envelopes_failed.load(Ordering::Relaxed),
            flush_timeouts: self.flush_timeouts.load(Ordering::Relaxed),
            max_batch_size: self.max_batch_size.load(Ordering::Relaxed),
            avg_batch_size: self.avg_batch_size(),
            avg_store_ms: self.avg_store_ms(),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub operations_submitted: u64,
    pub operations_succeeded: u64,
    pub operations_failed: u64,
    pub operations_pending: u64,
    pub turbo_calls: u64,
    pub flushes: u64,
    pub envelopes_failed: u64,
    pub flush_timeouts: u64,
    pub max_batch_size: u64,
    pub avg_batch_size: f64,
    pub avg_store_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_recording() {
        let metrics = CoordinatorMetrics::new();
        for _ in 0..6 {
            metrics.record_submitted();
        }
        metrics.record_pending(6);

        metrics.record_flush(4, EnvelopeState::Resolved, 4, Duration::from_millis(2));
        metrics.record_flush(2, EnvelopeState::Failed, 0, Duration::from_millis(4));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.operations_submitted, 6);
        assert_eq!(snapshot.operations_pending, 0);
        assert_eq!(snapshot.operations_succeeded, 4);
        assert_eq!(snapshot.operations_failed, 2);
        assert_eq!(snapshot.flushes, 2);
        assert_eq!(snapshot.envelopes_failed, 1);
        assert_eq!(snapshot.max_batch_size, 4);
        assert_eq!(snapshot.avg_batch_size, 3.0);
        assert!((snapshot.avg_store_ms - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_turbo_recording() {
        let metrics = CoordinatorMetrics::new();
        metrics.record_turbo(true, Duration::from_millis(1));
        metrics.record_turbo(false, Duration::from_millis(1));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.turbo_calls, 2);
        assert_eq!(snapshot.operations_succeeded, 1);
        assert_eq!(snapshot.operations_failed, 1);
        assert_eq!(snapshot.flushes, 0);
        assert_eq!(snapshot.avg_batch_size, 0.0);
    }
}
