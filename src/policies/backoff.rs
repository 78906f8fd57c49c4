//! # Backoff between caller-side retries.
//!
//! The delay before retry `n` (0-indexed) is `first × factor^n`, capped at `max`,
//! then jittered. The base is derived from the attempt number alone, so jitter never
//! compounds across attempts.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use taskgate::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(2),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//! assert_eq!(backoff.delay(0), Duration::from_secs(2));
//! assert_eq!(backoff.delay(2), Duration::from_secs(8));
//! assert_eq!(backoff.delay(5), Duration::from_secs(10));
//! ```

use std::time::Duration;

use super::jitter::JitterPolicy;

/// Exponential backoff with a cap and optional jitter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub first: Duration,
    /// Upper bound of the base delay (jitter may add to it with `Additive`).
    pub max: Duration,
    /// Growth per attempt; `1.0` keeps the delay constant.
    pub factor: f64,
    /// Randomization applied to the capped base.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// 2s, 4s, 8s, ... capped at 30s, plus up to 1s of additive jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(2),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::Additive(Duration::from_secs(1)),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait before retry number `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        let base = if secs.is_finite() && secs >= 0.0 && secs <= self.max.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        };
        self.jitter.apply(base)
    }
}
