//! Token-bucket admission control for outbound API calls.
//!
//! Tokens accrue continuously at a configured rate up to a burst capacity;
//! each admitted request consumes one. There is no fixed tick: refill is
//! computed from elapsed time on every acquire attempt.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Token-bucket rate limiter.
///
/// `acquire` suspends the calling task until enough tokens are available.
/// Acquisitions are serialized: the bucket state is guarded by a single
/// async mutex held across the wait, so waiters queue rather than race.
/// Waiting is not a busy-spin: each waiter computes its exact deficit and
/// sleeps `deficit / rate` seconds before rechecking.
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter refilling `tokens_per_second` with a burst cap of
    /// `capacity`. The bucket starts full.
    pub fn new(tokens_per_second: f64, capacity: u32) -> Self {
        Self {
            rate: tokens_per_second,
            capacity: f64::from(capacity),
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Acquire `n` tokens, waiting as long as necessary.
    ///
    /// Fails immediately with a validation error if `n` exceeds the bucket
    /// capacity, since that request could never be satisfied. The wait
    /// itself is unbounded; callers needing a deadline must race it
    /// externally.
    pub async fn acquire(&self, n: u32) -> Result<()> {
        let needed = f64::from(n);
        if needed > self.capacity {
            return Err(Error::validation(format!(
                "Requested tokens ({}) exceed bucket capacity ({})",
                n, self.capacity
            )));
        }

        let mut state = self.state.lock().await;
        loop {
            state.refill(self.rate, self.capacity);

            if state.tokens >= needed {
                state.tokens -= needed;
                return Ok(());
            }

            let deficit = needed - state.tokens;
            let wait = Duration::from_secs_f64(deficit / self.rate);
            tokio::time::sleep(wait).await;
        }
    }

    /// Acquire a single token: permission to send one request.
    pub async fn acquire_one(&self) -> Result<()> {
        self.acquire(1).await
    }

    /// Estimate of currently available tokens. Diagnostic only: the value
    /// may be stale by the time the caller observes it.
    pub async fn available(&self) -> f64 {
        let state = self.state.lock().await;
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        (state.tokens + elapsed * self.rate).min(self.capacity)
    }

    /// Burst capacity of the bucket.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

impl BucketState {
    fn refill(&mut self, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = now;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_wait() {
        let limiter = RateLimiter::new(2.0, 4);

        // Full burst is available immediately.
        for _ in 0..4 {
            limiter.acquire(1).await.unwrap();
        }
        let available = limiter.available().await;
        assert!(available < 1.0, "bucket should be drained, got {available}");

        // The next acquire must wait ~0.5s for one token at 2 tokens/sec.
        let start = Instant::now();
        limiter.acquire(1).await.unwrap();
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(400), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refills_to_full_after_capacity_over_rate() {
        let limiter = RateLimiter::new(2.0, 4);
        for _ in 0..4 {
            limiter.acquire(1).await.unwrap();
        }

        // capacity / rate = 2 seconds back to full.
        tokio::time::sleep(Duration::from_secs(2)).await;
        let available = limiter.available().await;
        assert!(
            (available - 4.0).abs() < 0.1,
            "expected a full bucket, got {available}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_never_exceed_capacity() {
        let limiter = RateLimiter::new(100.0, 5);
        tokio::time::sleep(Duration::from_secs(60)).await;
        let available = limiter.available().await;
        assert!(available <= 5.0);

        limiter.acquire(5).await.unwrap();
        assert!(limiter.available().await >= 0.0);
    }

    #[tokio::test]
    async fn test_over_capacity_request_rejected() {
        let limiter = RateLimiter::new(3.0, 10);
        let err = limiter.acquire(11).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        // Still rejected regardless of current token level.
        for _ in 0..10 {
            limiter.acquire(1).await.unwrap();
        }
        let err = limiter.acquire(11).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquirers_are_serialized() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(10.0, 2));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire(1).await }));
        }

        let start = Instant::now();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        // 6 acquisitions against a burst of 2 at 10/sec: at least 0.4s of
        // refill time must elapse.
        assert!(start.elapsed() >= Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_rate() {
        let limiter = RateLimiter::new(0.5, 1);
        limiter.acquire(1).await.unwrap();

        let start = Instant::now();
        limiter.acquire(1).await.unwrap();
        // One token at 0.5/sec takes ~2 seconds.
        assert!(start.elapsed() >= Duration::from_millis(1900));
    }
}
