//! # BoundedQueue: admission, FIFO scheduling and graceful shutdown.
//!
//! The [`BoundedQueue`] caps how many operations run at once against a shared,
//! rate-limited upstream. Excess submissions wait in a bounded FIFO; beyond that they
//! are refused immediately with [`QueueError::Full`].
//!
//! ## Architecture
//! ```text
//! submit/enqueue ──► lock ─► admit ─► broadcast ─► schedule heads ─► unlock
//!                                   │ Full → TaskRejected, Err(Full)
//!                                   ▼
//!                              dispatch(): started and orphaned heads, then callbacks
//!                                   │
//!                                   ├─► TaskStarting ─► Job::start ─► RunContext::execute
//!                                   │                                   │ (tokio task)
//!                                   │                                   ▼
//!                                   │                         settle (stats, events)
//!                                   │                                   │
//!                                   │                         reply ─► Ticket::outcome
//!                                   └──────────────────────────◄────────┘ pump() again
//!
//! Events: every step publishes to the Bus ─► listener ─► SubscriberSet (if configured)
//! ```
//!
//! ## Rules
//! - One mutex guards the state; it is never held across an `.await` or while user
//!   callbacks run.
//! - Strict FIFO: a task never starts before one submitted earlier that is still waiting.
//! - Exactly one outcome per admitted task.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use taskgate::{BoundedQueue, QueueConfig, QueueError, SubmitOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let queue = BoundedQueue::new(QueueConfig {
//!         max_concurrent: 2,
//!         max_queue_size: 8,
//!         timeout: Duration::from_secs(5),
//!         ..QueueConfig::default()
//!     });
//!
//!     let answer: Result<u32, QueueError<std::io::Error>> =
//!         queue.submit(|_ctx| async { Ok(42) }).await;
//!     assert_eq!(answer.unwrap(), 42);
//!
//!     let ticket = queue
//!         .enqueue(
//!             |_ctx| async { Ok::<_, std::io::Error>("done") },
//!             SubmitOptions::new().on_progress(|p| println!("position {}", p.position)),
//!         )
//!         .unwrap();
//!     assert_eq!(ticket.outcome().await.unwrap(), "done");
//!
//!     assert_eq!(queue.stats().total_processed, 2);
//! }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::error::{QueueError, RuntimeError, Withdrawn};
use crate::events::{Bus, Event, EventKind};
use crate::stats::{QueueStats, QueueStatus};

use super::builder::QueueBuilder;
use super::job::OpJob;
use super::progress::{Broadcast, Progress, ProgressSink, SubmitOptions};
use super::runner::RunContext;
use super::shutdown;
use super::state::{QueueState, Refusal, Scheduled, Settled, Waiter};
use super::ticket::Ticket;

/// Shared core of a queue; every clone of [`BoundedQueue`] and every running task
/// holds an `Arc` to it.
pub(crate) struct Inner {
    pub(crate) cfg: QueueConfig,
    pub(crate) bus: Bus,
    /// Cancelled on forced shutdown; running operations get child tokens.
    pub(crate) runtime: CancellationToken,
    /// Cancelled when the last reference goes away; stops the event listener.
    pub(crate) lifetime: CancellationToken,
    state: Mutex<QueueState>,
    load: watch::Sender<usize>,
    next_id: AtomicU64,
}

impl Inner {
    pub(crate) fn new(cfg: QueueConfig, bus: Bus) -> Self {
        let state = Mutex::new(QueueState::new(&cfg));
        let (load, _) = watch::channel(0);
        Self {
            cfg,
            bus,
            runtime: CancellationToken::new(),
            lifetime: CancellationToken::new(),
            state,
            load,
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sync_load(&self, st: &QueueState) {
        self.load.send_replace(st.load());
    }

    /// Starts waiting heads while slots are free.
    ///
    /// Positions are re-broadcast when something left the waiting list, or always when
    /// `rebroadcast` is set (a slot was just released, so `running` changed).
    pub(crate) fn pump(self: &Arc<Self>, rebroadcast: bool) {
        let (scheduled, running, waiting, positions) = {
            let mut st = self.lock();
            let scheduled = st.schedule();
            let positions = if rebroadcast || !scheduled.is_empty() {
                st.broadcast()
            } else {
                Broadcast::empty()
            };
            self.sync_load(&st);
            (scheduled, st.running(), st.waiting_len(), positions)
        };
        self.dispatch(scheduled, running, waiting);
        positions.deliver();
    }

    /// Publishes and launches the result of a scheduling pass. Called unlocked.
    fn dispatch(self: &Arc<Self>, scheduled: Scheduled, running: usize, waiting: usize) {
        for w in scheduled.orphaned {
            self.bus.publish(
                Event::new(EventKind::TaskCancelled)
                    .with_task(w.id)
                    .with_reason("caller dropped before start"),
            );
            w.job.withdraw(Withdrawn::Cancelled);
        }
        for w in scheduled.started {
            self.bus.publish(
                Event::new(EventKind::TaskStarting)
                    .with_task(w.id)
                    .with_elapsed(w.enqueued_at.elapsed())
                    .with_depth(running, waiting),
            );
            w.job.start(RunContext {
                queue: Arc::clone(self),
                id: w.id,
                sink: w.sink,
            });
        }
    }

    /// Releases the slot of a started task and publishes its terminal event.
    pub(crate) fn settle(
        &self,
        id: u64,
        sink: &ProgressSink,
        settled: Settled,
        elapsed: Duration,
        reason: Option<String>,
    ) {
        let (running, waiting) = {
            let mut st = self.lock();
            st.finish(settled);
            sink.set(Progress::Finished);
            self.sync_load(&st);
            (st.running(), st.waiting_len())
        };

        let ev = match settled {
            Settled::Succeeded(d) => Event::new(EventKind::TaskSucceeded).with_elapsed(d),
            Settled::TimedOut => {
                self.bus.publish(
                    Event::new(EventKind::TimeoutHit)
                        .with_task(id)
                        .with_timeout(self.cfg.timeout),
                );
                Event::new(EventKind::TaskFailed).with_elapsed(elapsed)
            }
            Settled::Failed => Event::new(EventKind::TaskFailed).with_elapsed(elapsed),
        };
        let ev = ev.with_task(id).with_depth(running, waiting);
        self.bus.publish(match reason {
            Some(r) => ev.with_reason(r),
            None => ev,
        });
    }

    pub(crate) fn abandon(&self) {
        self.lock().abandon();
    }

    pub(crate) fn abandoned_settled(&self, id: u64, elapsed: Duration) {
        self.lock().abandoned_settled();
        self.bus.publish(
            Event::new(EventKind::TaskAbandonedSettled)
                .with_task(id)
                .with_elapsed(elapsed),
        );
    }

    /// Removes a still-waiting task; `false` once it started or finished.
    pub(crate) fn withdraw(&self, id: u64) -> bool {
        let (w, positions) = {
            let mut st = self.lock();
            let Some(w) = st.withdraw(id) else {
                return false;
            };
            let positions = st.broadcast();
            self.sync_load(&st);
            (w, positions)
        };
        self.bus.publish(
            Event::new(EventKind::TaskCancelled)
                .with_task(id)
                .with_reason("withdrawn by caller"),
        );
        w.job.withdraw(Withdrawn::Cancelled);
        positions.deliver();
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

/// Bounded, FIFO admission queue in front of a concurrency-limited resource.
///
/// Cloning is cheap; clones share the same queue.
#[derive(Clone)]
pub struct BoundedQueue {
    inner: Arc<Inner>,
}

impl BoundedQueue {
    /// Creates a queue with no event subscribers.
    pub fn new(cfg: QueueConfig) -> Self {
        QueueBuilder::new(cfg).build()
    }

    /// Returns a builder for attaching subscribers.
    pub fn builder(cfg: QueueConfig) -> QueueBuilder {
        QueueBuilder::new(cfg)
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// Configuration this queue was built with.
    pub fn config(&self) -> &QueueConfig {
        &self.inner.cfg
    }

    /// Admits `op` and returns a [`Ticket`] for it without waiting for the outcome.
    ///
    /// `op` is invoked at most once, when the task reaches a running slot; it receives
    /// a [`CancellationToken`] that fires on timeout (with [`TimeoutAction::Cancel`])
    /// or forced shutdown.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - [`QueueError::Full`] when the waiting list is at capacity;
    /// - [`QueueError::Closed`] after [`close`](Self::close) or [`shutdown`](Self::shutdown).
    ///
    /// [`TimeoutAction::Cancel`]: crate::TimeoutAction::Cancel
    pub fn enqueue<F, Fut, T, E>(
        &self,
        op: F,
        opts: SubmitOptions,
    ) -> Result<Ticket<T, E>, QueueError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, outcome) = oneshot::channel();
        let (sink, progress) = ProgressSink::new(opts.on_progress);
        let waiter = Waiter {
            id,
            enqueued_at: Instant::now(),
            sink,
            job: Box::new(OpJob::new(op, reply)),
        };

        // Admit and schedule under one lock: an admitted task never waits beside a free slot.
        let admitted = {
            let mut st = self.inner.lock();
            let res = st.admit(waiter).map(|()| {
                let on_enqueue = st.broadcast();
                let scheduled = st.schedule();
                let after_start = if scheduled.is_empty() {
                    Broadcast::empty()
                } else {
                    st.broadcast()
                };
                (scheduled, on_enqueue, after_start)
            });
            self.inner.sync_load(&st);
            (res, st.running(), st.waiting_len())
        };

        match admitted {
            (Ok((scheduled, on_enqueue, after_start)), running, waiting) => {
                self.inner.bus.publish(
                    Event::new(EventKind::TaskQueued)
                        .with_task(id)
                        .with_depth(running, waiting),
                );
                self.inner.dispatch(scheduled, running, waiting);
                on_enqueue.deliver();
                after_start.deliver();
            }
            (Err(Refusal::Full), running, waiting) => {
                self.inner.bus.publish(
                    Event::new(EventKind::TaskRejected)
                        .with_task(id)
                        .with_reason("queue full")
                        .with_depth(running, waiting),
                );
                return Err(QueueError::Full {
                    capacity: self.inner.cfg.queue_capacity(),
                });
            }
            (Err(Refusal::Closed), ..) => return Err(QueueError::Closed),
        }

        Ok(Ticket::new(id, outcome, progress, Arc::downgrade(&self.inner)))
    }

    /// Submits `op` and waits for its outcome.
    pub async fn submit<F, Fut, T, E>(&self, op: F) -> Result<T, QueueError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.submit_with(op, SubmitOptions::new()).await
    }

    /// Submits `op` with per-task options (progress callback) and waits for its outcome.
    pub async fn submit_with<F, Fut, T, E>(
        &self,
        op: F,
        opts: SubmitOptions,
    ) -> Result<T, QueueError<E>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.enqueue(op, opts)?.outcome().await
    }

    /// Consistent snapshot of the queue's gauges and counters.
    pub fn stats(&self) -> QueueStats {
        self.inner.lock().snapshot()
    }

    /// Advisory availability and wait estimate for a new submission.
    pub fn status(&self) -> QueueStatus {
        self.stats().status()
    }

    /// Subscribes to the raw event stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.inner.bus.subscribe()
    }

    /// Stops admitting new tasks; admitted ones still run.
    pub fn close(&self) {
        self.inner.lock().close();
    }

    /// True after [`close`](Self::close) or [`shutdown`](Self::shutdown).
    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_closed()
    }

    /// Closes the queue and waits up to `grace` for running and waiting tasks to finish.
    ///
    /// On expiry, running operations are aborted (their callers get
    /// [`QueueError::Cancelled`]) and waiting tasks are failed with [`QueueError::Closed`].
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.inner
            .bus
            .publish(Event::new(EventKind::ShutdownRequested));
        self.close();

        let grace = self.inner.cfg.grace;
        let mut load = self.inner.load.subscribe();
        let drained = tokio::time::timeout(grace, async {
            let _ = load.wait_for(|n| *n == 0).await;
        })
        .await
        .is_ok();

        if drained {
            self.inner
                .bus
                .publish(Event::new(EventKind::AllStoppedWithin));
            return Ok(());
        }

        let (left, running) = {
            let mut st = self.inner.lock();
            let left = st.drain_waiting();
            self.inner.sync_load(&st);
            (left, st.running())
        };
        let waiting = left.len();
        for w in left {
            self.inner.bus.publish(
                Event::new(EventKind::TaskCancelled)
                    .with_task(w.id)
                    .with_reason("queue shut down"),
            );
            w.job.withdraw(Withdrawn::Closed);
        }
        self.inner.bus.publish(
            Event::new(EventKind::GraceExceeded)
                .with_timeout(grace)
                .with_depth(running, waiting),
        );
        self.inner.runtime.cancel();
        Err(RuntimeError::GraceExceeded {
            grace,
            running,
            waiting,
        })
    }

    /// Waits for a termination signal, then runs [`shutdown`](Self::shutdown).
    pub async fn shutdown_on_signal(&self) -> Result<(), RuntimeError> {
        let signal = shutdown::wait_for_shutdown_signal().await?;
        tracing::info!(target: "taskgate", signal, "shutdown signal received");
        self.shutdown().await
    }
}

impl std::fmt::Debug for BoundedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("cfg", &self.inner.cfg)
            .field("stats", &self.stats())
            .finish()
    }
}
