//! Retry logic with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::{BulletinError, Result};

/// Retry policy for transient fetch failures.
///
/// An operation is attempted once plus up to `max_retries` more times. Only
/// errors classified retryable ([`BulletinError::is_retryable`]) are retried;
/// 4xx responses and structural failures are terminal on the first attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub multiplier: f64,
    /// Fractional jitter applied symmetrically, e.g. 0.2 for ±20%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Execute `operation`, retrying retryable failures. Returns the result
    /// of the last attempt together with the number of retries consumed.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> (Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if retries > 0 {
                        debug!("Operation succeeded after {} retr{}", retries, if retries == 1 { "y" } else { "ies" });
                    }
                    return (Ok(result), retries);
                }
                Err(err) => {
                    if !err.is_retryable() || retries >= self.max_retries {
                        return (Err(err), retries);
                    }

                    let backoff = self.backoff_for(retries);
                    warn!(
                        "Attempt {}/{} failed: {} (retrying after {:?})",
                        retries + 1,
                        self.max_retries + 1,
                        err,
                        backoff
                    );
                    sleep(backoff).await;
                    retries += 1;
                }
            }
        }
    }

    /// Backoff before retry number `retry` (0-based): base × multiplier^retry,
    /// jittered by ±`jitter`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let base = self.base_backoff.as_secs_f64() * self.multiplier.powi(retry as i32);
        Duration::from_secs_f64(base * self.jitter_factor())
    }

    fn jitter_factor(&self) -> f64 {
        if self.jitter <= 0.0 {
            return 1.0;
        }
        use rand::Rng;
        let mut rng = rand::thread_rng();
        rng.gen_range(1.0 - self.jitter..=1.0 + self.jitter)
    }
}
