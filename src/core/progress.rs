//! # Per-task progress delivery.
//!
//! Every admitted task owns a [`ProgressSink`]:
//! - a `watch` channel carrying the task's [`Progress`] (read through the `Ticket`);
//! - an optional user callback receiving [`QueuePosition`] updates.
//!
//! The watch value is written under the queue lock, so it is strictly ordered.
//! Callbacks run **after** the lock is released (they may call back into the queue);
//! each broadcast carries an epoch and a sink drops any broadcast older than the
//! last one it delivered, so a reported position never moves backwards.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::stats::QueuePosition;
use crate::subscribers::panic_message;

/// Callback invoked with a waiting task's live position.
pub type ProgressFn = Arc<dyn Fn(QueuePosition) + Send + Sync>;

/// Where a submitted task currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// In the waiting list at the given position.
    Waiting(QueuePosition),
    /// Executing.
    Running,
    /// Outcome delivered (or about to be).
    Finished,
}

/// Options attached to a single submission.
///
/// ## Example
/// ```rust
/// use taskgate::SubmitOptions;
///
/// let opts = SubmitOptions::new().on_progress(|p| {
///     println!("#{} of {} ({} running)", p.position, p.total, p.running);
/// });
/// # let _ = opts;
/// ```
#[derive(Clone, Default)]
pub struct SubmitOptions {
    pub(crate) on_progress: Option<ProgressFn>,
}

impl SubmitOptions {
    /// Options with no callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback fired on enqueue and whenever the task's position or
    /// the running count changes while it waits.
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(QueuePosition) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for SubmitOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitOptions")
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

pub(crate) struct ProgressSink {
    callback: Option<ProgressFn>,
    tx: watch::Sender<Progress>,
    last_epoch: AtomicU64,
}

impl ProgressSink {
    pub(crate) fn new(callback: Option<ProgressFn>) -> (Arc<Self>, watch::Receiver<Progress>) {
        let (tx, rx) = watch::channel(Progress::Finished);
        let sink = Arc::new(Self {
            callback,
            tx,
            last_epoch: AtomicU64::new(0),
        });
        (sink, rx)
    }

    /// Called under the queue lock.
    pub(crate) fn set(&self, progress: Progress) {
        self.tx.send_replace(progress);
    }

    /// Called outside the queue lock. A panicking callback is logged and contained.
    fn notify(&self, epoch: u64, pos: QueuePosition) {
        if self.last_epoch.fetch_max(epoch, Ordering::AcqRel) >= epoch {
            return;
        }
        if let Some(cb) = &self.callback {
            if let Err(panic_err) = std::panic::catch_unwind(AssertUnwindSafe(|| cb(pos))) {
                tracing::warn!(
                    target: "taskgate",
                    position = pos.position,
                    panic = %panic_message(panic_err.as_ref()),
                    "progress callback panicked"
                );
            }
        }
    }
}

/// Positions computed under the lock, delivered to callbacks after it is released.
#[must_use]
pub(crate) struct Broadcast {
    epoch: u64,
    items: Vec<(Arc<ProgressSink>, QueuePosition)>,
}

impl Broadcast {
    pub(crate) fn new(epoch: u64, items: Vec<(Arc<ProgressSink>, QueuePosition)>) -> Self {
        Self { epoch, items }
    }

    pub(crate) fn empty() -> Self {
        Self {
            epoch: 0,
            items: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn items_for_test(&self) -> Vec<QueuePosition> {
        self.items.iter().map(|(_, p)| *p).collect()
    }

    pub(crate) fn deliver(self) {
        for (sink, pos) in self.items {
            sink.notify(self.epoch, pos);
        }
    }
}
