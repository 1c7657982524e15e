//! Request pacing for paginated walks.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::config::RateLimitConfig;

/// Paces upstream requests.
#[async_trait]
pub trait RateLimiter: Send + Sync + Debug {
    /// Wait until the next request may be issued.
    async fn acquire(&self);
}

/// Build a limiter from configuration.
pub fn from_config(config: &RateLimitConfig) -> Arc<dyn RateLimiter> {
    match config {
        RateLimitConfig::Fixed { delay } => Arc::new(FixedDelay::new(*delay)),
        RateLimitConfig::TokenBucket { per_second, burst } => {
            Arc::new(TokenBucket::new(*per_second, *burst))
        }
    }
}

/// Fixed pause on every acquire.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// No pacing at all.
    pub fn none() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl RateLimiter for FixedDelay {
    async fn acquire(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket limiter.
///
/// Starts full; refills at `rate` tokens per second up to `capacity`.
/// `acquire` waits for a token instead of failing.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    rate: f64,
    capacity: f64,
}

impl TokenBucket {
    pub fn new(rate: u32, capacity: u32) -> Self {
        let capacity = capacity.max(1) as f64;
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            rate: rate.max(1) as f64,
            capacity,
        }
    }

    /// Tokens currently available (after refill).
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_refill = now;
    }
}

#[async_trait]
impl RateLimiter for TokenBucket {
    async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }

                Duration::from_secs_f64((1.0 - state.tokens) / self.rate)
            };

            trace!(wait_ms = wait.as_millis() as u64, "rate limiter waiting for token");
            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_sleeps() {
        let limiter = FixedDelay::new(Duration::from_millis(100));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_burst_then_waits() {
        let bucket = TokenBucket::new(10, 2); // 10/s, burst 2
        let start = Instant::now();

        bucket.acquire().await;
        bucket.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(1));

        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(99));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_refills_to_capacity() {
        let bucket = TokenBucket::new(10, 3);
        bucket.acquire().await;
        bucket.acquire().await;
        bucket.acquire().await;
        assert!(bucket.available().await < 1.0);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(bucket.available().await, 3.0);
    }

    #[test]
    fn test_from_config() {
        let limiter = from_config(&RateLimitConfig::TokenBucket {
            per_second: 5,
            burst: 1,
        });
        assert!(format!("{:?}", limiter).contains("TokenBucket"));
    }
}
