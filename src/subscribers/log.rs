//! # LogWriter: renders queue events through `tracing`
//!
//! A minimal subscriber that turns incoming [`Event`]s into structured `tracing`
//! records. Install any `tracing` subscriber in the host binary to see them.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO taskgate: queued task=Some(12) running=Some(10) waiting=Some(3)
//! INFO taskgate: starting task=Some(9) waited_ms=Some(4210) running=Some(10)
//! WARN taskgate: timeout task=Some(4) timeout_ms=Some(180000)
//! WARN taskgate: rejected task=Some(412) running=Some(10) waiting=Some(200)
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::TaskQueued => {
                tracing::info!(target: "taskgate", task = ?e.task, running = ?e.running, waiting = ?e.waiting, "queued");
            }
            EventKind::TaskRejected => {
                tracing::warn!(target: "taskgate", task = ?e.task, running = ?e.running, waiting = ?e.waiting, "rejected");
            }
            EventKind::TaskCancelled => {
                tracing::info!(target: "taskgate", task = ?e.task, reason = ?e.reason, "cancelled");
            }
            EventKind::TaskStarting => {
                tracing::info!(target: "taskgate", task = ?e.task, waited_ms = ?e.elapsed_ms, running = ?e.running, "starting");
            }
            EventKind::TaskSucceeded => {
                tracing::info!(target: "taskgate", task = ?e.task, elapsed_ms = ?e.elapsed_ms, "succeeded");
            }
            EventKind::TaskFailed => {
                tracing::warn!(target: "taskgate", task = ?e.task, elapsed_ms = ?e.elapsed_ms, err = ?e.reason, "failed");
            }
            EventKind::TimeoutHit => {
                tracing::warn!(target: "taskgate", task = ?e.task, timeout_ms = ?e.timeout_ms, "timeout");
            }
            EventKind::TaskAbandonedSettled => {
                tracing::info!(target: "taskgate", task = ?e.task, elapsed_ms = ?e.elapsed_ms, "abandoned operation settled");
            }
            EventKind::ShutdownRequested => {
                tracing::info!(target: "taskgate", "shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                tracing::info!(target: "taskgate", "all tasks drained within grace");
            }
            EventKind::GraceExceeded => {
                tracing::warn!(target: "taskgate", running = ?e.running, waiting = ?e.waiting, "grace exceeded");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "taskgate", reason = ?e.reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(target: "taskgate", reason = ?e.reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
