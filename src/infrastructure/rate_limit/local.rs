//! In-process token bucket, the first-line throttle ahead of the shared
//! window.
//!
//! Tokens refill continuously based on elapsed time. Capacity equals the
//! refill rate, so a full second of quota can be spent as a burst.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Clone)]
pub struct LocalRateLimiter {
    tokens: Arc<Mutex<f64>>,
    capacity: f64,
    refill_rate: f64,
    last_refill: Arc<Mutex<Instant>>,
}

impl LocalRateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        assert!(requests_per_second > 0.0, "rate must be positive");

        Self {
            tokens: Arc::new(Mutex::new(requests_per_second)),
            capacity: requests_per_second,
            refill_rate: requests_per_second,
            last_refill: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Acquire a token, waiting if necessary.
    pub async fn acquire(&self) {
        loop {
            let mut tokens = self.tokens.lock().await;
            let mut last_refill = self.last_refill.lock().await;

            let now = Instant::now();
            let elapsed = now.duration_since(*last_refill).as_secs_f64();
            let refilled = (*tokens + elapsed * self.refill_rate).min(self.capacity);

            if refilled >= 1.0 {
                *tokens = refilled - 1.0;
                *last_refill = now;
                return;
            }

            let tokens_needed = 1.0 - refilled;
            let wait = Duration::from_secs_f64((tokens_needed / self.refill_rate).max(0.01));

            // Release locks before sleeping
            drop(tokens);
            drop(last_refill);

            sleep(wait).await;
        }
    }

    /// Current number of available tokens (for tests and monitoring).
    pub async fn available_tokens(&self) -> f64 {
        let tokens = self.tokens.lock().await;
        let last_refill = self.last_refill.lock().await;

        let elapsed = Instant::now().duration_since(*last_refill).as_secs_f64();
        (*tokens + elapsed * self.refill_rate).min(self.capacity)
    }
}
