//! # Queue events emitted by the admission queue and its runners.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Admission events**: what happened at `submit` time (queued, rejected)
//! - **Execution events**: task execution flow (starting, succeeded, failed, timeout)
//! - **Runtime events**: shutdown progress and subscriber health
//!
//! The [`Event`] struct carries additional metadata such as timestamps, task id,
//! wait/run durations and the queue depth observed at the time of the event.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use taskgate::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_task(7)
//!     .with_reason("upstream 500")
//!     .with_elapsed(Duration::from_millis(1200));
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.task, Some(7));
//! assert_eq!(ev.reason.as_deref(), Some("upstream 500"));
//! assert_eq!(ev.elapsed_ms, Some(1200));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of queue events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `reason`: subscriber name and panic message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `reason`: subscriber name and drop reason ("full", "closed")
    SubscriberOverflow,

    // === Admission events ===
    /// Task admitted into the waiting list.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `waiting`: waiting list length after admission
    /// - `running`: running count at admission
    TaskQueued,

    /// Task rejected because the waiting list is full.
    ///
    /// Sets:
    /// - `task`: id the task would have had
    /// - `reason`: "queue full"
    /// - `waiting`: waiting list length (equals the capacity)
    /// - `running`: running count at rejection
    TaskRejected,

    /// Waiting task withdrawn before it started (explicit cancel, caller gone, shutdown).
    ///
    /// Sets:
    /// - `task`: task id
    /// - `reason`: why it was withdrawn
    TaskCancelled,

    // === Execution events ===
    /// Task left the waiting list and is about to execute.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `elapsed_ms`: time spent waiting
    /// - `running`: running count including this task
    TaskStarting,

    /// Task operation resolved successfully.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `elapsed_ms`: execution time
    /// - `running`, `waiting`: queue depth after the slot was released
    TaskSucceeded,

    /// Task operation failed (error, panic, timeout or forced abort).
    ///
    /// Sets:
    /// - `task`: task id
    /// - `elapsed_ms`: execution time
    /// - `reason`: failure message
    TaskFailed,

    /// Task exceeded the configured timeout (always followed by `TaskFailed`).
    ///
    /// Sets:
    /// - `task`: task id
    /// - `timeout_ms`: configured timeout
    TimeoutHit,

    /// A detached, timed-out operation finally settled in the background.
    ///
    /// Sets:
    /// - `task`: task id
    /// - `elapsed_ms`: total run time of the abandoned operation
    TaskAbandonedSettled,

    // === Shutdown events ===
    /// Shutdown requested (explicit call or OS signal).
    ShutdownRequested,

    /// Running and waiting tasks drained within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; remaining work was aborted.
    ///
    /// Sets:
    /// - `timeout_ms`: the grace period
    /// - `running`: tasks still running when grace expired
    /// - `waiting`: tasks still waiting when grace expired
    GraceExceeded,
}

/// Queue event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Id of the task, if applicable.
    pub task: Option<u64>,
    /// Wait or run time in milliseconds (meaning depends on `kind`).
    pub elapsed_ms: Option<u64>,
    /// Configured timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Waiting list length observed with this event.
    pub waiting: Option<usize>,
    /// Running count observed with this event.
    pub running: Option<usize>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            elapsed_ms: None,
            timeout_ms: None,
            waiting: None,
            running: None,
            reason: None,
        }
    }

    /// Attaches a task id.
    #[inline]
    pub fn with_task(mut self, id: u64) -> Self {
        self.task = Some(id);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a wait or run duration (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed_ms = Some(d.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches the queue depth (`running`, `waiting`) observed with this event.
    #[inline]
    pub fn with_depth(mut self, running: usize, waiting: usize) -> Self {
        self.running = Some(running);
        self.waiting = Some(waiting);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} panic={info}"))
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    /// True for events that end a task's life in the queue.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::TaskSucceeded
                | EventKind::TaskFailed
                | EventKind::TaskCancelled
                | EventKind::TaskRejected
        )
    }
}
