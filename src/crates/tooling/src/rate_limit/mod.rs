//! Rate limiting utilities
//!
//! Token bucket admission control for callers that share one upstream budget.
//! Waiters are served in arrival order: a single queue lock is held by the
//! caller at the head of the line while it sleeps for the next token, and
//! `tokio::sync::Mutex` grants that lock in FIFO order.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::{Result, ToolingError};

/// Seconds of burst the bucket can hold at its refill rate.
pub const BURST_SECONDS: f64 = 10.0;

/// Token bucket rate limiter
///
/// Capacity is `rate * BURST_SECONDS`, never less than one token, so slow
/// rates still admit one caller per `1 / rate` seconds. The bucket starts
/// full and refills continuously by `elapsed * rate`, capped at capacity.
///
/// # Example
///
/// ```rust,ignore
/// use tooling::rate_limit::RateLimiter;
///
/// // 5 admissions per second, 50 burst
/// let limiter = RateLimiter::new(5.0)?;
/// limiter.acquire().await;
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<Bucket>>,
    queue: Arc<Mutex<()>>,
}

struct Bucket {
    /// Maximum number of tokens
    capacity: f64,

    /// Tokens added per second
    rate: f64,

    /// Current number of tokens
    tokens: f64,

    /// Last refill time
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter admitting `rate` operations per second.
    pub fn new(rate: f64) -> Result<Self> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(ToolingError::General(format!(
                "Rate limit must be a positive number, got {}",
                rate
            )));
        }

        let capacity = (rate * BURST_SECONDS).max(1.0);
        Ok(Self {
            bucket: Arc::new(Mutex::new(Bucket {
                capacity,
                rate,
                tokens: capacity,
                last_refill: Instant::now(),
            })),
            queue: Arc::new(Mutex::new(())),
        })
    }

    /// Take a token if one is available right now.
    ///
    /// Does not join the waiting queue; a caller already queued keeps its
    /// place only if it goes through [`RateLimiter::acquire`].
    pub async fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock().await;
        bucket.take()
    }

    /// Wait until a token is granted.
    ///
    /// Callers are admitted in the order they arrived.
    pub async fn acquire(&self) {
        let _turn = self.queue.lock().await;

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                if bucket.take() {
                    return;
                }
                bucket.time_until_token()
            };

            trace!(wait_ms = wait.as_millis() as u64, "Waiting for rate limit token");
            tokio::time::sleep(wait).await;
        }
    }

    /// Whole tokens available immediately.
    pub async fn available(&self) -> usize {
        let mut bucket = self.bucket.lock().await;
        bucket.refill();
        bucket.tokens.floor() as usize
    }

    /// Bucket capacity in tokens.
    pub async fn capacity(&self) -> f64 {
        self.bucket.lock().await.capacity
    }
}

impl Bucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    fn take(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_token(&self) -> Duration {
        let missing = (1.0 - self.tokens).max(0.0);
        // Never sleep zero: a rounding shortfall would otherwise spin.
        Duration::from_secs_f64(missing / self.rate).max(Duration::from_micros(100))
    }
}
