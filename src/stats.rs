//! # Queue statistics.
//!
//! [`Counters`] accumulate inside the queue state (under its lock); readers get an
//! immutable [`QueueStats`] snapshot. [`QueueStatus`] is the small advisory view a
//! client polls before or while submitting; it reserves nothing.
//!
//! Counters never shrink. The average processing time is the mean of the most recent
//! successful durations, bounded by `QueueConfig::history_window`.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

/// Wait estimate used while no successful run has been recorded yet.
const FALLBACK_PROCESSING: Duration = Duration::from_secs(30);

/// Rolling window over the most recent processing durations.
#[derive(Debug)]
pub(crate) struct DurationWindow {
    samples: VecDeque<Duration>,
    cap: usize,
    sum: Duration,
}

impl DurationWindow {
    pub(crate) fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            samples: VecDeque::with_capacity(cap),
            cap,
            sum: Duration::ZERO,
        }
    }

    pub(crate) fn record(&mut self, d: Duration) {
        if self.samples.len() == self.cap {
            if let Some(old) = self.samples.pop_front() {
                self.sum = self.sum.saturating_sub(old);
            }
        }
        self.samples.push_back(d);
        self.sum = self.sum.saturating_add(d);
    }

    /// Mean of the window, `None` when empty.
    pub(crate) fn mean(&self) -> Option<Duration> {
        let n = u32::try_from(self.samples.len()).ok().filter(|n| *n > 0)?;
        Some(self.sum / n)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Monotonic counters plus the duration window.
#[derive(Debug)]
pub(crate) struct Counters {
    pub processed: u64,
    pub queued: u64,
    pub rejected: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub durations: DurationWindow,
}

impl Counters {
    pub(crate) fn new(window: usize) -> Self {
        Self {
            processed: 0,
            queued: 0,
            rejected: 0,
            errors: 0,
            timeouts: 0,
            cancelled: 0,
            durations: DurationWindow::new(window),
        }
    }
}

/// Immutable snapshot of a queue's state and counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Operations currently executing.
    pub running: usize,
    /// Tasks admitted but not yet started.
    pub queued: usize,
    /// Configured concurrency ceiling.
    pub max_concurrent: usize,
    /// Configured waiting-list capacity.
    pub max_queue_size: usize,
    /// Operations that resolved successfully.
    pub total_processed: u64,
    /// Tasks ever admitted into the waiting list.
    pub total_queued: u64,
    /// Submissions refused because the waiting list was full.
    pub total_rejected: u64,
    /// Operations that failed, panicked, timed out or were aborted.
    pub total_errors: u64,
    /// Subset of `total_errors` caused by the timeout.
    pub total_timeouts: u64,
    /// Admitted tasks withdrawn before they started.
    pub total_cancelled: u64,
    /// Timed-out operations still running detached (`TimeoutAction::Detach`).
    pub abandoned: usize,
    /// Mean of the recent successful durations in milliseconds (0 if none).
    pub avg_processing_ms: u64,
}

impl QueueStats {
    /// True when a new submission would start without waiting.
    #[inline]
    pub fn has_free_slot(&self) -> bool {
        self.running < self.max_concurrent
    }

    /// Derives the advisory [`QueueStatus`].
    ///
    /// The estimate assumes each batch of `max_concurrent` waiting tasks takes one
    /// average processing time (30s until a first success is recorded).
    pub fn status(&self) -> QueueStatus {
        let estimated_wait_sec = if self.queued == 0 {
            0
        } else {
            let avg_ms = if self.avg_processing_ms == 0 {
                FALLBACK_PROCESSING.as_millis() as u64
            } else {
                self.avg_processing_ms
            };
            let batches = self.queued.div_ceil(self.max_concurrent.max(1)) as u64;
            (avg_ms.saturating_mul(batches) + 500) / 1000
        };

        QueueStatus {
            available: self.has_free_slot(),
            position: self.queued,
            estimated_wait_sec,
        }
    }
}

/// Advisory view for clients deciding whether (or how long) to wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// A slot is free right now.
    pub available: bool,
    /// How many tasks are waiting (a new submission would be behind all of them).
    pub position: usize,
    /// Rough wait estimate for a new submission, in seconds.
    pub estimated_wait_sec: u64,
}

/// Live position of one waiting task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePosition {
    /// 1-based rank in the waiting list.
    pub position: usize,
    /// Length of the waiting list.
    pub total: usize,
    /// Operations currently executing.
    pub running: usize,
    /// Configured concurrency ceiling.
    pub max_concurrent: usize,
}
