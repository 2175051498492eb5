//! Retry utilities with exponential backoff.
//!
//! Store reads on the hot path can fail transiently. This module retries
//! operations whose error reports itself as retryable
//! ([`OrgError::is_retryable`]) and returns every other error immediately, so
//! a missing configuration is never retried but a dropped connection is.
//!
//! # Example
//!
//! ```rust,no_run
//! use org_core::retry::{with_retry, RetryConfig};
//! use org_core::OrgResult;
//!
//! async fn example() -> OrgResult<String> {
//!     with_retry(&RetryConfig::default(), "load_config", || async {
//!         Ok("value".to_string())
//!     })
//!     .await
//! }
//! ```

use std::time::Duration;
use tokio::time::sleep;

use crate::error::OrgResult;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Initial delay before the first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Base for exponential backoff (typically 2.0)
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            exponential_base: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a configuration that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            exponential_base: 1.0,
        }
    }
}

/// Execute a store operation with retries.
///
/// The operation is attempted up to `max_attempts` times. Only errors for
/// which [`OrgError::is_retryable`](crate::OrgError::is_retryable) holds are
/// retried; the last error is returned once the attempts are exhausted.
///
/// # Arguments
///
/// * `config` - Retry configuration
/// * `operation` - Name of the operation, used in log fields
/// * `f` - Function producing the operation's future
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: &str, mut f: F) -> OrgResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = OrgResult<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(operation, attempts = attempt, "Store operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= config.max_attempts.max(1) => {
                tracing::error!(
                    operation,
                    attempts = attempt,
                    error = %e,
                    "All store retry attempts exhausted"
                );
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    operation,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Store operation failed, retrying"
                );

                sleep(delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.exponential_base)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}
