//! Retry with exponential backoff and jitter.
//!
//! The delay after failed attempt `n` (0-indexed) is
//! `min(base * (2^n + jitter), cap)` with `jitter` drawn from `[0, 1)`.
//! With the defaults (1s base, 10s cap) that is 1-2s, then 2-3s.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::BridgeError;

/// Attempt budget and delay bounds for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            max_delay: config.max_delay,
        }
    }

    /// Delay for a given jitter fraction; exposed so tests can pin the jitter.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = 2f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let factor = exponent + jitter.clamp(0.0, 1.0);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Delay to sleep after failed attempt `attempt` (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_with_jitter(attempt, rand::random::<f64>())
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// The operation succeeded.
    Success {
        result: T,
        /// Total number of attempts made (1 = first try succeeded).
        attempts: u32,
    },
    /// Every attempt failed with a retryable error.
    Exhausted {
        last_error: BridgeError,
        attempts: u32,
    },
    /// An attempt failed with an error that retrying cannot fix.
    Aborted { error: BridgeError, attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Success { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Aborted { attempts, .. } => *attempts,
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt budget runs out. Sleeps between attempts, never after the last.
pub async fn retry_async<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BridgeError>>,
{
    let max = policy.max_attempts.max(1);

    for attempt in 0..max {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "Retry succeeded");
                }
                return RetryOutcome::Success {
                    result,
                    attempts: attempt + 1,
                };
            }
            Err(error) if !error.is_retryable() => {
                debug!(attempt = attempt + 1, %error, "Error is not retryable, giving up");
                return RetryOutcome::Aborted {
                    error,
                    attempts: attempt + 1,
                };
            }
            Err(error) => {
                if attempt + 1 >= max {
                    warn!(attempts = max, %error, "All retry attempts exhausted");
                    return RetryOutcome::Exhausted {
                        last_error: error,
                        attempts: max,
                    };
                }
                let delay = policy.delay_for(attempt);
                debug!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    // max >= 1, so the loop always returns
    RetryOutcome::Exhausted {
        last_error: BridgeError::MaxRetriesExceeded,
        attempts: max,
    }
}
