// src/utils/limiter.rs

//! Token bucket shared by every worker that talks to one remote source.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with `capacity` burst and a steady refill rate.
#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    capacity: f64,
    refill_per_sec: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// A full bucket; `refill_per_sec` must be positive.
    pub fn new(name: &'static str, capacity: u32, refill_per_sec: f64) -> Self {
        let capacity = capacity.max(1) as f64;
        Self {
            name,
            capacity,
            refill_per_sec: refill_per_sec.max(f64::MIN_POSITIVE),
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Interval at which a single token is produced.
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refill_per_sec)
    }

    /// Take one token, waiting for the bucket to refill if needed.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return Ok(());
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_per_sec)
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Tokens currently available, for diagnostics.
    pub async fn available(&self) -> f64 {
        let bucket = self.bucket.lock().await;
        let elapsed = Instant::now()
            .duration_since(bucket.last_refill)
            .as_secs_f64();
        (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity)
    }
}

/// One limiter per remote source, built once at start-up and shared by
/// every client of that source.
#[derive(Debug, Clone)]
pub struct Limiters {
    pub steam: Arc<RateLimiter>,
    pub rgl: Arc<RateLimiter>,
    pub etf2l: Arc<RateLimiter>,
    pub logstf: Arc<RateLimiter>,
    pub serveme: Arc<RateLimiter>,
    pub bd_lists: Arc<RateLimiter>,
    pub sourcebans: Arc<RateLimiter>,
}

impl Default for Limiters {
    fn default() -> Self {
        Self {
            steam: Arc::new(RateLimiter::new("steam", 200, 1.0)),
            rgl: Arc::new(RateLimiter::new("rgl", 5, 0.5)),
            etf2l: Arc::new(RateLimiter::new("etf2l", 5, 0.5)),
            logstf: Arc::new(RateLimiter::new("logstf", 5, 1.0)),
            serveme: Arc::new(RateLimiter::new("serveme", 2, 0.1)),
            bd_lists: Arc::new(RateLimiter::new("bd_lists", 10, 1.0)),
            sourcebans: Arc::new(RateLimiter::new("sourcebans", 10, 1.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_then_refill() {
        let limiter = RateLimiter::new("test", 2, 1.0);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(10));

        limiter.acquire(&cancel).await.unwrap();
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(990), "{waited:?}");
        assert!(waited <= Duration::from_millis(1100), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn uncontended_acquire_within_one_interval() {
        let limiter = RateLimiter::new("test", 1, 2.0);
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let start = Instant::now();
        limiter.acquire(&cancel).await.unwrap();
        assert!(start.elapsed() <= limiter.interval() + Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_unblocks() {
        let limiter = RateLimiter::new("test", 1, 0.001);
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let child = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            child.cancel();
        });
        let result = limiter.acquire(&cancel).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }
}
