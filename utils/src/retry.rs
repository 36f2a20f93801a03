//! Retry policy shared by every chain read.
//!
//! A failed attempt is classified by the caller's error type through
//! [`Classify`]:
//! - [`RetryClass::Permanent`] errors are returned after the first attempt.
//! - [`RetryClass::Transient`] errors are retried with exponential backoff
//!   (the delay doubles per retry and is capped at `max_delay_ms`) until
//!   `max_retries` retries have been spent.

use std::{fmt::Display, future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Classification of errors for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Structural failure, retrying cannot change the outcome.
    Permanent,
    /// Timeouts, refused connections, 5xx from an upstream node.
    Transient,
}

pub trait Classify {
    fn retry_class(&self) -> RetryClass;
}

/// Configuration for retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay in milliseconds before the first retry.
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds between retries.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay slept before retry number `retry` (zero based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let delay = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Run `attempt_fn` until it succeeds, fails permanently, or the policy's
/// retries are exhausted. The last error is returned unchanged.
pub async fn retry_with_policy<T, E, F, Fut>(
    policy: &RetryPolicy,
    description: &str,
    mut attempt_fn: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + Display,
{
    let mut retry = 0;
    loop {
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if err.retry_class() == RetryClass::Permanent {
                    debug!(description, error = %err, "permanent failure, not retrying");
                    return Err(err);
                }
                if retry >= policy.max_retries {
                    warn!(
                        description,
                        attempts = retry + 1,
                        error = %err,
                        "retries exhausted"
                    );
                    return Err(err);
                }
                let delay = policy.delay_for_retry(retry);
                warn!(
                    attempt = retry + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    description,
                    error = %err,
                    "attempt failed, retrying with backoff"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
        }
    }
}
