//! # Queue state: the single serialization point.
//!
//! [`QueueState`] holds everything the admission queue mutates: the running count,
//! the FIFO of waiting tasks, the counters and the closed flag. It is a plain,
//! synchronous state machine; `BoundedQueue` wraps it in a `std::sync::Mutex` and
//! performs all side effects (spawning, events, callbacks) after releasing the lock.
//!
//! ## Invariants
//! - `running <= max_concurrent`
//! - `waiting.len() <= max_queue_size`
//! - FIFO: tasks leave `waiting` from the head only (withdrawal excepted)
//! - `processed + errors` == tasks that started and settled

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::QueueConfig;
use crate::stats::{Counters, QueuePosition, QueueStats};

use super::job::Job;
use super::progress::{Broadcast, Progress, ProgressSink};

/// One admitted, not yet started task.
pub(crate) struct Waiter {
    pub id: u64,
    pub enqueued_at: Instant,
    pub sink: Arc<ProgressSink>,
    pub job: Box<dyn Job>,
}

/// Why admission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Refusal {
    Full,
    Closed,
}

/// How a started task settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settled {
    Succeeded(Duration),
    Failed,
    TimedOut,
}

/// Result of one scheduling pass.
#[derive(Default)]
pub(crate) struct Scheduled {
    /// Popped from the head and counted as running.
    pub started: Vec<Waiter>,
    /// Popped from the head because their caller is gone; never run.
    pub orphaned: Vec<Waiter>,
}

impl Scheduled {
    pub(crate) fn is_empty(&self) -> bool {
        self.started.is_empty() && self.orphaned.is_empty()
    }
}

pub(crate) struct QueueState {
    max_concurrent: usize,
    max_queue_size: usize,
    running: usize,
    abandoned: usize,
    waiting: VecDeque<Waiter>,
    counters: Counters,
    closed: bool,
    epoch: u64,
}

impl QueueState {
    pub(crate) fn new(cfg: &QueueConfig) -> Self {
        Self {
            max_concurrent: cfg.concurrency_limit(),
            max_queue_size: cfg.queue_capacity(),
            running: 0,
            abandoned: 0,
            waiting: VecDeque::with_capacity(cfg.queue_capacity().min(1024)),
            counters: Counters::new(cfg.history_window_clamped()),
            closed: false,
            epoch: 0,
        }
    }

    #[inline]
    pub(crate) fn running(&self) -> usize {
        self.running
    }

    #[inline]
    pub(crate) fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    /// Running plus waiting; zero means fully drained.
    #[inline]
    pub(crate) fn load(&self) -> usize {
        self.running + self.waiting.len()
    }

    /// Appends a task to the waiting list, or refuses it.
    ///
    /// Rejection depends only on the waiting list length, never on `running`.
    pub(crate) fn admit(&mut self, waiter: Waiter) -> Result<(), Refusal> {
        if self.closed {
            return Err(Refusal::Closed);
        }
        if self.waiting.len() >= self.max_queue_size {
            self.counters.rejected += 1;
            return Err(Refusal::Full);
        }
        self.waiting.push_back(waiter);
        self.counters.queued += 1;
        Ok(())
    }

    /// Starts as many head tasks as free slots allow.
    pub(crate) fn schedule(&mut self) -> Scheduled {
        let mut out = Scheduled::default();
        while self.running < self.max_concurrent {
            let Some(w) = self.waiting.pop_front() else {
                break;
            };
            if w.job.is_orphaned() {
                self.counters.cancelled += 1;
                w.sink.set(Progress::Finished);
                out.orphaned.push(w);
                continue;
            }
            self.running += 1;
            w.sink.set(Progress::Running);
            out.started.push(w);
        }
        debug_assert!(self.running <= self.max_concurrent);
        out
    }

    /// Releases a running slot and records the outcome.
    pub(crate) fn finish(&mut self, settled: Settled) {
        debug_assert!(self.running > 0, "finish without a running task");
        self.running = self.running.saturating_sub(1);
        match settled {
            Settled::Succeeded(d) => {
                self.counters.processed += 1;
                self.counters.durations.record(d);
            }
            Settled::Failed => self.counters.errors += 1,
            Settled::TimedOut => {
                self.counters.errors += 1;
                self.counters.timeouts += 1;
            }
        }
    }

    /// Removes a waiting task by id. `None` if it already started or finished.
    pub(crate) fn withdraw(&mut self, id: u64) -> Option<Waiter> {
        let idx = self.waiting.iter().position(|w| w.id == id)?;
        let w = self.waiting.remove(idx)?;
        self.counters.cancelled += 1;
        w.sink.set(Progress::Finished);
        Some(w)
    }

    /// Refuses further admissions.
    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Empties the waiting list (forced shutdown); drained tasks count as cancelled.
    pub(crate) fn drain_waiting(&mut self) -> Vec<Waiter> {
        let drained: Vec<Waiter> = self.waiting.drain(..).collect();
        self.counters.cancelled += drained.len() as u64;
        for w in &drained {
            w.sink.set(Progress::Finished);
        }
        drained
    }

    pub(crate) fn abandon(&mut self) {
        self.abandoned += 1;
    }

    pub(crate) fn abandoned_settled(&mut self) {
        self.abandoned = self.abandoned.saturating_sub(1);
    }

    /// Computes every waiting task's position and stamps it into their watch channels.
    ///
    /// Callbacks are returned as a [`Broadcast`] to be delivered after unlocking.
    pub(crate) fn broadcast(&mut self) -> Broadcast {
        if self.waiting.is_empty() {
            return Broadcast::empty();
        }
        self.epoch += 1;
        let total = self.waiting.len();
        let items = self
            .waiting
            .iter()
            .enumerate()
            .map(|(idx, w)| {
                let pos = QueuePosition {
                    position: idx + 1,
                    total,
                    running: self.running,
                    max_concurrent: self.max_concurrent,
                };
                w.sink.set(Progress::Waiting(pos));
                (Arc::clone(&w.sink), pos)
            })
            .collect();
        Broadcast::new(self.epoch, items)
    }

    pub(crate) fn snapshot(&self) -> QueueStats {
        let c = &self.counters;
        QueueStats {
            running: self.running,
            queued: self.waiting.len(),
            max_concurrent: self.max_concurrent,
            max_queue_size: self.max_queue_size,
            total_processed: c.processed,
            total_queued: c.queued,
            total_rejected: c.rejected,
            total_errors: c.errors,
            total_timeouts: c.timeouts,
            total_cancelled: c.cancelled,
            abandoned: self.abandoned,
            avg_processing_ms: c
                .durations
                .mean()
                .map(|d| (d.as_secs_f64() * 1000.0).round() as u64)
                .unwrap_or(0),
        }
    }
}
