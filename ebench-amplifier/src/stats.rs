//! Run statistics and the final report.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use ebench_core::{OperationResult, OperationStatus};
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::AmplifierError;

/// Highest latency tracked with full precision (60 s in microseconds)
const MAX_TRACKED_US: u64 = 60_000_000;

/// Accumulator shared by all workers of a run
#[derive(Debug)]
pub struct RunStats {
    issued: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    latency_us: Mutex<Histogram<u64>>,
    errors: Mutex<HashMap<&'static str, u64>>,
}

impl RunStats {
    pub fn new() -> Result<Self, AmplifierError> {
        Ok(Self {
            issued: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            latency_us: Mutex::new(Histogram::new_with_bounds(1, MAX_TRACKED_US, 3)?),
            errors: Mutex::new(HashMap::new()),
        })
    }

    /// Count an operation as dispatched
    pub fn record_issued(&self) {
        self.issued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the terminal result of an issued operation
    pub fn record(&self, result: &OperationResult, latency: Duration) {
        let counter = match result.status {
            OperationStatus::Ok => &self.succeeded,
            OperationStatus::Failed => &self.failed,
            OperationStatus::TimedOut => &self.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Some(error) = &result.error {
            *self.errors.lock().entry(error.kind()).or_insert(0) += 1;
        }

        let us = (latency.as_micros() as u64).max(1);
        self.latency_us.lock().saturating_record(us);
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    /// Number of operations that reached a terminal result
    pub fn terminal(&self) -> u64 {
        self.succeeded() + self.failed() + self.timed_out()
    }

    pub fn latency(&self) -> LatencySummary {
        let hist = self.latency_us.lock();
        if hist.is_empty() {
            return LatencySummary::default();
        }
        LatencySummary {
            min_us: hist.min(),
            mean_us: hist.mean(),
            p50_us: hist.value_at_quantile(0.50),
            p90_us: hist.value_at_quantile(0.90),
            p99_us: hist.value_at_quantile(0.99),
            max_us: hist.max(),
        }
    }

    pub fn report(&self, elapsed: Duration, max_in_flight: usize) -> RunReport {
        let issued = self.issued();
        let secs = elapsed.as_secs_f64();
        let achieved_qps = if secs > 0.0 { issued as f64 / secs } else { 0.0 };
        let errors = self
            .errors
            .lock()
            .iter()
            .map(|(kind, count)| (kind.to_string(), *count))
            .collect();

        RunReport {
            timestamp: Utc::now().to_rfc3339(),
            issued,
            succeeded: self.succeeded(),
            failed: self.failed(),
            timed_out: self.timed_out(),
            elapsed_ms: secs * 1000.0,
            achieved_qps,
            max_in_flight,
            latency: self.latency(),
            errors,
        }
    }
}

/// Latency percentiles in microseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub min_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p90_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Final report of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: String,
    pub issued: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub elapsed_ms: f64,
    pub achieved_qps: f64,
    pub max_in_flight: usize,
    pub latency: LatencySummary,
    /// Failure counts by error kind
    pub errors: BTreeMap<String, u64>,
}

impl RunReport {
    pub fn terminal(&self) -> u64 {
        self.succeeded + self.failed + self.timed_out
    }

    /// Print a human readable summary
    pub fn print(&self) {
        let ms = |us: u64| us as f64 / 1000.0;

        println!();
        println!("==================================================");
        println!("  ebench amplifier report ({})", self.timestamp);
        println!("==================================================");
        println!("  Issued:        {}", self.issued);
        println!("  Succeeded:     {}", self.succeeded);
        println!("  Failed:        {}", self.failed);
        println!("  Timed out:     {}", self.timed_out);
        println!("  Elapsed:       {:.1} ms", self.elapsed_ms);
        println!("  Achieved QPS:  {:.1}", self.achieved_qps);
        println!("  Max in flight: {}", self.max_in_flight);
        println!();
        println!("  Latency:");
        println!("    p50: {:.2} ms", ms(self.latency.p50_us));
        println!("    p90: {:.2} ms", ms(self.latency.p90_us));
        println!("    p99: {:.2} ms", ms(self.latency.p99_us));
        println!("    max: {:.2} ms", ms(self.latency.max_us));
        if !self.errors.is_empty() {
            println!();
            println!("  Errors:");
            for (kind, count) in &self.errors {
                println!("    {}: {}", kind, count);
            }
        }
        println!("==================================================");
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ebench_core::OperationError;

    #[test]
    fn test_counts_by_status() {
        let stats = RunStats::new().unwrap();
        for _ in 0..4 {
            stats.record_issued();
        }
        stats.record(&OperationResult::ok(None), Duration::from_millis(2));
        stats.record(&OperationResult::ok(None), Duration::from_millis(4));
        stats.record(
            &OperationResult::failed(OperationError::rejected("dup")),
            Duration::from_millis(1),
        );
        stats.record(&OperationResult::timed_out(Duration::from_secs(1)), Duration::from_secs(1));

        assert_eq!(stats.issued(), 4);
        assert_eq!(stats.succeeded(), 2);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.timed_out(), 1);
        assert_eq!(stats.terminal(), 4);

        let report = stats.report(Duration::from_secs(2), 3);
        assert_eq!(report.achieved_qps, 2.0);
        assert_eq!(report.errors.get("operation_rejected"), Some(&1));
        assert_eq!(report.errors.get("request_timeout"), Some(&1));
        assert_eq!(report.max_in_flight, 3);
    }

    #[test]
    fn test_latency_percentiles() {
        let stats = RunStats::new().unwrap();
        for ms in 1..=100 {
            stats.record(&OperationResult::ok(None), Duration::from_millis(ms));
        }
        let latency = stats.latency();
        assert!((49_000..=51_000).contains(&latency.p50_us), "{:?}", latency);
        assert!((89_000..=91_000).contains(&latency.p90_us), "{:?}", latency);
        assert!(latency.p99_us >= 98_000);
        assert!(latency.max_us >= 99_900);
    }

    #[test]
    fn test_empty_report() {
        let stats = RunStats::new().unwrap();
        let report = stats.report(Duration::ZERO, 0);
        assert_eq!(report.terminal(), 0);
        assert_eq!(report.latency, LatencySummary::default());
        assert_eq!(report.achieved_qps, 0.0);
    }

    #[test]
    fn test_report_serializes() {
        let stats = RunStats::new().unwrap();
        stats.record(&OperationResult::ok(None), Duration::from_millis(3));
        let json = serde_json::to_value(stats.report(Duration::from_secs(1), 1)).unwrap();
        assert!(json["latency"]["p99_us"].as_u64().unwrap() > 0);
        assert!(json["timestamp"].as_str().is_some());
    }
}
