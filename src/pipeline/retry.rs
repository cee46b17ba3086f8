//! Bounded fixed-interval retry
//!
//! Wraps a fallible async operation in a sequential retry loop. Attempts
//! never overlap; the wait between attempts suspends the task without
//! occupying a worker thread.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::errors::SourceError;

/// Retry constants supplied by the caller from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    pub interval: Duration,
}

/// Run `operation` up to `policy.max_attempts` times.
///
/// A success returns immediately. A retryable failure with attempts left
/// invokes `on_retry` with the upcoming attempt number (2-based: it fires
/// before attempts 2..=max), waits `policy.interval`, and tries again. A
/// non-retryable failure, or a failure on the final attempt, yields the last
/// error.
pub async fn run_with_retry<T, F, Fut, C>(
    mut operation: F,
    policy: RetryPolicy,
    mut on_retry: C,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
    C: FnMut(u32),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt >= max_attempts {
                    debug!("giving up after {} attempts: {}", attempt, err);
                    return Err(err);
                }
                attempt += 1;
                debug!("attempt {}/{} after: {}", attempt, max_attempts, err);
                on_retry(attempt);
                sleep(policy.interval).await;
            }
        }
    }
}
