//! Shared token-bucket rate limiter.
//!
//! One limiter gates every worker, so the aggregate rate is `target_qps`
//! no matter how many workers run. Capacity is `max(1, qps / 10)` and the
//! bucket refills continuously. Waiters queue on a fair mutex and are
//! served in arrival order.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::RateLimitError;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

impl Bucket {
    fn refill(&mut self, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last = now;
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    /// Tokens per second; 0 disables throttling
    rate: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(target_qps: u64) -> Self {
        let rate = target_qps as f64;
        let capacity = (target_qps / 10).max(1) as f64;
        Self {
            rate,
            capacity,
            bucket: Mutex::new(Bucket { tokens: capacity, last: Instant::now() }),
        }
    }

    pub fn unthrottled() -> Self {
        Self::new(0)
    }

    pub fn is_unthrottled(&self) -> bool {
        self.rate == 0.0
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Wait for one token, or fail once `cancel` fires
    pub async fn take(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        if self.is_unthrottled() {
            return Ok(());
        }

        let mut bucket = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
            bucket = self.bucket.lock() => bucket,
        };

        bucket.refill(self.rate, self.capacity);
        if bucket.tokens < 1.0 {
            let wait = Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
            bucket.refill(self.rate, self.capacity);
        }

        bucket.tokens = (bucket.tokens - 1.0).max(0.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_capacity() {
        assert_eq!(RateLimiter::new(5).capacity(), 1.0);
        assert_eq!(RateLimiter::new(100).capacity(), 10.0);
        assert_eq!(RateLimiter::new(2500).capacity(), 250.0);
    }

    #[tokio::test]
    async fn test_unthrottled_never_waits() {
        let limiter = RateLimiter::unthrottled();
        let cancel = CancellationToken::new();
        for _ in 0..10_000 {
            limiter.take(&cancel).await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_steady_rate() {
        let limiter = RateLimiter::new(50);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        // The initial burst of 5 is free.
        for _ in 0..5 {
            limiter.take(&cancel).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(1));

        for _ in 0..100 {
            limiter.take(&cancel).await.unwrap();
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1990), "elapsed {:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(2200), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_across_workers() {
        let limiter = Arc::new(RateLimiter::new(20));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    limiter.take(&cancel).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // 40 tokens at 20/s with a burst of 2: the aggregate, not per worker.
        assert!(start.elapsed() >= Duration::from_millis(1890));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_unblocks_waiter() {
        let limiter = Arc::new(RateLimiter::new(1));
        let cancel = CancellationToken::new();
        limiter.take(&cancel).await.unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.take(&cancel).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(RateLimitError::Cancelled));
    }
}
