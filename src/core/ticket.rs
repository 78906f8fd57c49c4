//! Handle to one admitted task.

use std::fmt;
use std::sync::Weak;

use tokio::sync::{oneshot, watch};

use crate::error::QueueError;
use crate::stats::QueuePosition;

use super::progress::Progress;
use super::queue::Inner;

/// Returned by [`BoundedQueue::enqueue`](crate::BoundedQueue::enqueue).
///
/// Dropping a ticket of a task that has not started yet withdraws it: the queue skips
/// it when it reaches the head. A running task is not affected; its outcome is discarded.
pub struct Ticket<T, E> {
    id: u64,
    outcome: oneshot::Receiver<Result<T, QueueError<E>>>,
    progress: watch::Receiver<Progress>,
    queue: Weak<Inner>,
}

impl<T, E> Ticket<T, E> {
    pub(crate) fn new(
        id: u64,
        outcome: oneshot::Receiver<Result<T, QueueError<E>>>,
        progress: watch::Receiver<Progress>,
        queue: Weak<Inner>,
    ) -> Self {
        Self {
            id,
            outcome,
            progress,
            queue,
        }
    }

    /// Queue-unique task id, as carried by [`Event::task`](crate::Event::task).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Latest known progress.
    pub fn state(&self) -> Progress {
        *self.progress.borrow()
    }

    /// Current position in the waiting list, `None` once started.
    pub fn position(&self) -> Option<QueuePosition> {
        match self.state() {
            Progress::Waiting(pos) => Some(pos),
            Progress::Running | Progress::Finished => None,
        }
    }

    /// A receiver that yields every progress change of this task.
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.progress.clone()
    }

    /// Withdraws the task if it is still waiting.
    ///
    /// Returns `false` if it already started (or finished); the outcome is then
    /// delivered as usual. On success the outcome is [`QueueError::Cancelled`].
    pub fn cancel(&self) -> bool {
        self.queue
            .upgrade()
            .is_some_and(|queue| queue.withdraw(self.id))
    }

    /// Waits for the task's terminal outcome.
    pub async fn outcome(self) -> Result<T, QueueError<E>> {
        self.outcome.await.unwrap_or(Err(QueueError::Cancelled))
    }
}

impl<T, E> fmt::Debug for Ticket<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("id", &self.id)
            .field("progress", &self.state())
            .finish()
    }
}
