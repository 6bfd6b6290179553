//! Prometheus metrics for the ebench proxy
//!
//! Exposes metrics in Prometheus format for monitoring and observability.

use std::time::Duration;

use ebench_core::{Domain, OperationKind, OperationStatus};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry for ebench metrics
    pub static ref REGISTRY: Registry = Registry::new();

    // ============== Operation Metrics ==============

    /// Operations resolved, by domain, kind and terminal status
    pub static ref OPERATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("operations_total", "Total number of operations resolved")
            .namespace("ebench"),
        &["domain", "kind", "status"]
    ).expect("metric can be created");

    /// Time from submission to resolution, by kind
    pub static ref OPERATION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "operation_duration_seconds",
            "Operation latency inside the proxy in seconds"
        )
        .namespace("ebench")
        .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["kind"]
    ).expect("metric can be created");

    // ============== Batch Metrics ==============

    /// Envelope sizes at flush time
    pub static ref BATCH_SIZE: Histogram = Histogram::with_opts(
        HistogramOpts::new("batch_size", "Operations per flushed envelope")
            .namespace("ebench")
            .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0])
    ).expect("metric can be created");

    /// Store call duration per flush
    pub static ref FLUSH_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("flush_duration_seconds", "Store call duration per flush in seconds")
            .namespace("ebench")
            .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0])
    ).expect("metric can be created");

    /// Envelopes that failed as a whole, by cause
    pub static ref ENVELOPES_FAILED_TOTAL: CounterVec = CounterVec::new(
        Opts::new("envelopes_failed_total", "Total envelopes that failed as a whole")
            .namespace("ebench"),
        &["cause"]
    ).expect("metric can be created");

    // ============== Store Metrics ==============

    /// Backing store health status (1 = healthy, 0 = unhealthy)
    pub static ref STORE_HEALTHY: Gauge = Gauge::with_opts(
        Opts::new("store_healthy", "Store health status (1=healthy, 0=unhealthy)")
            .namespace("ebench")
    ).expect("metric can be created");
}

/// Register all metrics with the global registry.
/// Should be called once at startup.
pub fn register_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(OPERATION_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(BATCH_SIZE.clone()))?;
    REGISTRY.register(Box::new(FLUSH_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(ENVELOPES_FAILED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_HEALTHY.clone()))?;
    Ok(())
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# Error encoding metrics: {}", e))
}

/// Record one resolved operation.
pub fn record_operation(domain: Domain, kind: OperationKind, status: OperationStatus, latency: Duration) {
    let status = status.to_string();
    OPERATIONS_TOTAL
        .with_label_values(&[domain.as_str(), kind.as_str(), status.as_str()])
        .inc();
    OPERATION_DURATION_SECONDS
        .with_label_values(&[kind.as_str()])
        .observe(latency.as_secs_f64());
}

/// Record a flushed envelope.
pub fn record_flush(size: usize, elapsed: Duration) {
    BATCH_SIZE.observe(size as f64);
    FLUSH_DURATION_SECONDS.observe(elapsed.as_secs_f64());
}

/// Record an envelope that failed as a whole.
pub fn record_envelope_failed(cause: &str) {
    ENVELOPES_FAILED_TOTAL.with_label_values(&[cause]).inc();
}

/// Set store health status.
pub fn set_store_healthy(healthy: bool) {
    STORE_HEALTHY.set(if healthy { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_operation() {
        let before = OPERATIONS_TOTAL
            .with_label_values(&["payment", "create", "ok"])
            .get();
        record_operation(
            Domain::Payment,
            OperationKind::Create,
            OperationStatus::Ok,
            Duration::from_millis(3),
        );
        let after = OPERATIONS_TOTAL
            .with_label_values(&["payment", "create", "ok"])
            .get();
        assert_eq!(after - before, 1.0);
    }

    #[test]
    fn test_flush_and_failure_metrics() {
        record_flush(8, Duration::from_millis(1));
        record_envelope_failed("batch_timeout");
        assert!(BATCH_SIZE.get_sample_count() >= 1);
        assert!(ENVELOPES_FAILED_TOTAL.with_label_values(&["batch_timeout"]).get() >= 1.0);
    }

    #[test]
    fn test_encode_metrics() {
        let output = encode_metrics();
        // Should return something (even if registry not initialized)
        assert!(output.is_empty() || output.starts_with('#') || output.contains("ebench"));
    }
}
