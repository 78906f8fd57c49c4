//! # Caller-side retry.
//!
//! The queue never re-enqueues a task by itself. When a caller wants to try again
//! after [`QueueError::Full`] or [`QueueError::Timeout`], it wraps its submission in
//! [`retry`]; [`retry_when`] accepts a custom predicate (e.g. to also retry an upstream
//! "quota exhausted" error carried in [`QueueError::Failed`]).
//!
//! # Example
//! ```rust
//! use taskgate::{BoundedQueue, QueueConfig, RetryPolicy, retry};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let queue = BoundedQueue::new(QueueConfig::default());
//!     let out = retry(&RetryPolicy::default(), |_attempt| {
//!         queue.submit(|_ctx| async { Ok::<_, std::io::Error>("ok") })
//!     })
//!     .await;
//!     assert_eq!(out.unwrap(), "ok");
//! }
//! ```

use std::future::Future;

use crate::error::QueueError;

use super::backoff::BackoffPolicy;

/// How many times to retry and how long to wait in between.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` disables retrying.
    pub max_retries: u32,
    /// Delay schedule between attempts.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    /// Three retries with [`BackoffPolicy::default`].
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or the retry
/// budget is spent. Retryable means [`QueueError::is_retryable`].
///
/// `attempt` receives the 0-based attempt number.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, attempt: F) -> Result<T, QueueError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, QueueError<E>>>,
{
    retry_when(policy, attempt, QueueError::is_retryable).await
}

/// Like [`retry`], with the retry decision made by `should_retry`.
pub async fn retry_when<F, Fut, T, Er, P>(
    policy: &RetryPolicy,
    mut attempt: F,
    mut should_retry: P,
) -> Result<T, Er>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Er>>,
    P: FnMut(&Er) -> bool,
{
    let mut n = 0;
    loop {
        match attempt(n).await {
            Ok(v) => return Ok(v),
            Err(e) if n < policy.max_retries && should_retry(&e) => {
                let delay = policy.backoff.delay(n);
                tracing::debug!(
                    target: "taskgate",
                    attempt = n + 1,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "retrying after retryable failure"
                );
                tokio::time::sleep(delay).await;
                n += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
