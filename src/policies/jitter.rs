//! # Jitter for retry delays.
//!
//! Spreads resubmissions from many callers so they do not hit a recovering upstream
//! in lockstep.
//!
//! - [`JitterPolicy::None`]: exact delay
//! - [`JitterPolicy::Full`]: uniform in `[0, delay]`
//! - [`JitterPolicy::Equal`]: `delay/2 + uniform[0, delay/2]`
//! - [`JitterPolicy::Additive`]: `delay + uniform[0, spread]`

use std::time::Duration;

use rand::Rng;

/// Randomization applied on top of a backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No randomization.
    #[default]
    None,
    /// Random delay in `[0, delay]`.
    Full,
    /// Keeps at least half of the delay.
    Equal,
    /// Never shortens the delay; adds up to the given spread.
    Additive(Duration),
}

impl JitterPolicy {
    /// Applies the jitter to `delay`.
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let mut rng = rand::rng();
        match *self {
            JitterPolicy::None => delay,
            JitterPolicy::Full if ms == 0 => Duration::ZERO,
            JitterPolicy::Full => Duration::from_millis(rng.random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                Duration::from_millis(half + rng.random_range(0..=ms - half))
            }
            JitterPolicy::Additive(spread) => {
                let spread = u64::try_from(spread.as_millis()).unwrap_or(u64::MAX);
                delay.saturating_add(Duration::from_millis(rng.random_range(0..=spread)))
            }
        }
    }
}
