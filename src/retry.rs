//! Attempt-budget retry logic for remote requests
//!
//! This module provides the retry loop used by the request executor. Failures
//! are classified through [`IsRetryable`]: non-retryable failures return after
//! the first attempt, rate-limited failures wait out a fixed cool-down before
//! the regular inter-attempt delay, and everything else waits the regular
//! delay. Both waits come before the budget check, so the last failed attempt
//! waits too. At most `retries + 1` attempts are made.
//!
//! # Example
//!
//! ```no_run
//! use session_fleet::retry::{IsRetryable, RetryPolicy, with_retry};
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let policy = RetryPolicy::new(1, Duration::from_secs(3), Duration::from_secs(60));
//! let (value, attempts) = with_retry(&policy, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await.map_err(|(e, _attempts)| e)?;
//! # Ok(())
//! # }
//! ```

use crate::config::RequestConfig;
use crate::error::FailureKind;
use std::future::Future;
use std::time::Duration;

/// Trait for failures that can be classified as retryable or not
///
/// Transient failures (network errors, 5xx, rate limiting) should return `true`.
/// Failures that say the request itself is wrong (400, 401, an aborted stream)
/// should return `false`.
pub trait IsRetryable {
    /// Returns true if the failure is transient and the operation should be retried
    fn is_retryable(&self) -> bool;

    /// Returns true if the remote asked us to slow down
    fn is_rate_limited(&self) -> bool {
        false
    }
}

impl IsRetryable for FailureKind {
    fn is_retryable(&self) -> bool {
        match self {
            FailureKind::RateLimited | FailureKind::Generic => true,
            FailureKind::TransportAborted
            | FailureKind::Unauthorized
            | FailureKind::BadRequest
            | FailureKind::Timeout => false,
        }
    }

    fn is_rate_limited(&self) -> bool {
        matches!(self, FailureKind::RateLimited)
    }
}

/// Retry budget and delays for one call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Delay before every retry
    pub delay: Duration,
    /// Extra wait after a rate-limited attempt, before the regular delay
    pub rate_limit_cooldown: Duration,
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(retries: u32, delay: Duration, rate_limit_cooldown: Duration) -> Self {
        Self {
            retries,
            delay,
            rate_limit_cooldown,
        }
    }

    /// Same delays, different budget
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

impl From<&RequestConfig> for RetryPolicy {
    fn from(config: &RequestConfig) -> Self {
        Self::new(
            config.retries,
            config.delay_between_requests,
            config.rate_limit_cooldown,
        )
    }
}

/// Execute an async operation under an attempt budget
///
/// # Arguments
///
/// * `policy` - Retry budget, inter-attempt delay, and rate-limit cool-down
/// * `operation` - Async closure that returns `Result<T, E>` where E implements IsRetryable
///
/// # Returns
///
/// The successful value with the number of attempts it took, or the last
/// failure with the number of attempts made.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<(T, u32), (E, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "request succeeded after retry");
                }
                return Ok((result, attempt));
            }
            Err(e) if !e.is_retryable() => {
                tracing::debug!(error = %e, attempt, "request failed with non-retryable error");
                return Err((e, attempt));
            }
            Err(e) => {
                if e.is_rate_limited() {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        cooldown_secs = policy.rate_limit_cooldown.as_secs(),
                        "rate limited, cooling down"
                    );
                    tokio::time::sleep(policy.rate_limit_cooldown).await;
                }

                // The delay is taken before the budget check, after the last attempt too
                tokio::time::sleep(policy.delay).await;

                if attempt > policy.retries {
                    tracing::warn!(
                        error = %e,
                        attempts = attempt,
                        "request failed after all retry attempts exhausted"
                    );
                    return Err((e, attempt));
                }

                tracing::warn!(
                    error = %e,
                    attempt,
                    retries = policy.retries,
                    delay_ms = policy.delay.as_millis() as u64,
                    "request failed, retrying"
                );
            }
        }
    }
}
