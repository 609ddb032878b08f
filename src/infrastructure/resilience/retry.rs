//! Bounded retry with exponential backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::models::RetryConfig;
use crate::domain::ports::{LlmError, SourceError};

/// Errors that can tell a transient failure from a permanent one.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for SourceError {
    fn is_transient(&self) -> bool {
        SourceError::is_transient(self)
    }
}

impl Transient for LlmError {
    fn is_transient(&self) -> bool {
        LlmError::is_transient(self)
    }
}

/// Retry policy for transient errors.
///
/// Backoff before retry `n` (0-based) is `initial * multiplier^n`, capped at
/// `max_backoff`. Permanent errors return immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
            multiplier: 2.0,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms.max(config.initial_backoff_ms)),
            multiplier: config.multiplier.max(1.0),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Execute an operation, retrying transient failures.
    ///
    /// `operation` is called at most `max_attempts` times.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + Display,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "operation succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if self.should_retry(&err, attempt) {
                        let backoff = self.calculate_backoff(attempt);
                        warn!(
                            attempt = attempt + 1,
                            error = %err,
                            backoff_ms = backoff.as_millis() as u64,
                            "transient failure, retrying"
                        );
                        sleep(backoff).await;
                        attempt += 1;
                    } else {
                        if err.is_transient() {
                            warn!(attempts = attempt + 1, error = %err, "retries exhausted");
                        } else {
                            debug!(error = %err, "permanent error, not retrying");
                        }
                        return Err(err);
                    }
                }
            }
        }
    }

    fn should_retry<E: Transient>(&self, err: &E, attempt: u32) -> bool {
        err.is_transient() && attempt + 1 < self.max_attempts
    }

    /// Backoff before the retry following `attempt`.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let backoff = self.initial_backoff.as_secs_f64() * factor;
        if !backoff.is_finite() || backoff >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(backoff)
    }
}
