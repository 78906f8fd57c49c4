//! # Queue configuration.
//!
//! Provides [`QueueConfig`], the construction parameters of a
//! [`BoundedQueue`](crate::BoundedQueue). Values are fixed for the lifetime of the queue.
//!
//! ## Sentinel values
//! - `timeout = 0s` → no timeout (operations may run forever)
//! - `max_concurrent = 0`, `max_queue_size = 0` → clamped to 1 (every submission
//!   passes through the waiting list, so a zero-sized list would reject everything)
//! - `bus_capacity = 0`, `history_window = 0` → clamped to 1
//!
//! ## Loading
//! `QueueConfig` implements `serde::Deserialize`; durations are expressed in
//! milliseconds and every field is optional:
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg: taskgate::QueueConfig =
//!     serde_json::from_str(r#"{ "max_concurrent": 4, "timeout_ms": 60000 }"#)?;
//! assert_eq!(cfg.max_concurrent, 4);
//! assert_eq!(cfg.max_queue_size, 200);
//! # Ok(()) }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens to an operation whose time budget expires.
///
/// In both cases the running slot is released at the moment the timeout fires and
/// the caller receives [`QueueError::Timeout`](crate::QueueError::Timeout).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    /// Cancel the operation's token and abort its future.
    #[default]
    Cancel,

    /// Let the operation run to completion in the background and discard its result.
    ///
    /// The operation still occupies the upstream; it is reported by
    /// [`QueueStats::abandoned`](crate::QueueStats::abandoned) until it settles.
    Detach,
}

/// Configuration for a bounded admission queue.
///
/// ## Field semantics
/// - `max_concurrent`: ceiling on simultaneously running operations
/// - `max_queue_size`: ceiling on waiting (not running) tasks
/// - `timeout`: per-task execution budget, measured from start (`0s` = none)
/// - `timeout_action`: cancel or detach an operation that exceeded `timeout`
/// - `bus_capacity`: event bus ring buffer size
/// - `grace`: how long `shutdown` waits for running and waiting work to drain
/// - `history_window`: number of recent successful durations kept for the average
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of operations executing at once.
    pub max_concurrent: usize,

    /// Maximum number of admitted-but-not-started tasks.
    pub max_queue_size: usize,

    /// Per-task execution timeout.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,

    /// Behaviour when `timeout` fires.
    pub timeout_action: TimeoutAction,

    /// Capacity of the event bus broadcast channel.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` events skip older items.
    pub bus_capacity: usize,

    /// Maximum time `shutdown` waits for the queue to drain before aborting work.
    #[serde(rename = "grace_ms", with = "duration_ms")]
    pub grace: Duration,

    /// Size of the rolling window used for the average processing time.
    pub history_window: usize,
}

impl QueueConfig {
    /// Returns the concurrency ceiling clamped to a minimum of 1.
    #[inline]
    pub fn concurrency_limit(&self) -> usize {
        self.max_concurrent.max(1)
    }

    /// Returns the waiting-list capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity(&self) -> usize {
        self.max_queue_size.max(1)
    }

    /// Returns the per-task timeout as an `Option`.
    ///
    /// - `None` → no timeout
    /// - `Some(d)` → timeout applied to each execution
    #[inline]
    pub fn task_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the rolling window size clamped to a minimum of 1.
    #[inline]
    pub fn history_window_clamped(&self) -> usize {
        self.history_window.max(1)
    }
}

impl Default for QueueConfig {
    /// Default configuration:
    ///
    /// - `max_concurrent = 10`
    /// - `max_queue_size = 200`
    /// - `timeout = 3min`, cancelled on expiry
    /// - `bus_capacity = 1024`
    /// - `grace = 10s`
    /// - `history_window = 100`
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_queue_size: 200,
            timeout: Duration::from_secs(3 * 60),
            timeout_action: TimeoutAction::Cancel,
            bus_capacity: 1024,
            grace: Duration::from_secs(10),
            history_window: 100,
        }
    }
}

/// Serializes a [`Duration`] as whole milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
