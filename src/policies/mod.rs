//! Caller-side retry policies.
//!
//! The queue itself never retries: a task that failed, timed out or was refused is
//! terminal. Callers that want another attempt resubmit through [`retry`] /
//! [`retry_when`], pacing themselves with a [`BackoffPolicy`].
//!
//! ## Contents
//! - [`RetryPolicy`] how many times to retry (default 3)
//! - [`BackoffPolicy`] how delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`] randomization so many callers do not retry in lockstep

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::{RetryPolicy, retry, retry_when};
