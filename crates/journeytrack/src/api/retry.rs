//! Bounded retry with exponential backoff for list-style upstream calls.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::{ApiError, ApiResult};

/// How often and how patiently to retry a failing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped.
#[must_use]
pub fn backoff_delay(policy: &RetryPolicy, retry: u32) -> Duration {
    let factor = 2u32.saturating_pow(retry.saturating_sub(1).min(20));
    policy.base_delay.saturating_mul(factor).min(policy.max_delay)
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// `NotFound` is returned immediately since retrying will not change it.
///
/// # Errors
///
/// Returns the last error once all attempts have failed.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e @ ApiError::NotFound(_)) => return Err(e),
            Err(e) if attempt >= attempts => {
                warn!(operation, attempts, error = %e, "Giving up after retries");
                return Err(e);
            }
            Err(e) => {
                let delay = backoff_delay(policy, attempt);
                debug!(
                    operation,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
