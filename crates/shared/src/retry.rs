use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Bounded retry with exponential backoff and random jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, initial_delay: Duration, max_jitter: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_jitter,
        }
    }

    /// Text model calls: 5 attempts starting at 5s.
    pub const fn text_model() -> Self {
        Self::new(5, Duration::from_secs(5), Duration::from_secs(2))
    }

    /// Image generation: 3 attempts starting at 5s.
    pub const fn image_model() -> Self {
        Self::new(3, Duration::from_secs(5), Duration::from_secs(2))
    }

    /// News fetch and blog calls: 3 attempts starting at 1s.
    pub const fn http() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::ZERO)
    }

    /// No sleeping between attempts. Used by tests.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    pub fn backoff(&self, attempt: u32, rate_limited: bool) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        // Rate limits wait much longer than transient failures.
        let base = if rate_limited {
            Duration::from_secs(15 * (attempt as u64 + 1))
        } else {
            self.initial_delay * 2_u32.saturating_pow(attempt)
        };

        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let wait = self.backoff(attempt, e.is_rate_limit());
                    tracing::warn!(
                        operation = label,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        error = %e,
                        "Attempt failed, retrying in {:?}",
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(operation = label, attempts, error = %e, "Giving up after retries");
                    }
                    return Err(e);
                }
            }
        }
    }
}
