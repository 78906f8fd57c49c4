//! # Type-erased queue entries.
//!
//! The waiting list stores heterogeneous submissions (different closures, result and
//! error types) behind the [`Job`] trait. [`OpJob`] is the only implementation: it
//! pairs the user's operation with the one-shot reply channel of its `Ticket`.

use std::future::Future;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{QueueError, Withdrawn};

use super::runner::RunContext;

/// Reply channel carrying a task's single terminal outcome.
pub(crate) type Reply<T, E> = oneshot::Sender<Result<T, QueueError<E>>>;

/// An admitted unit of work, as seen by the scheduler.
pub(crate) trait Job: Send {
    /// Begins execution in the slot described by `run`.
    fn start(self: Box<Self>, run: RunContext);

    /// Resolves the task without running it.
    fn withdraw(self: Box<Self>, why: Withdrawn);

    /// True once nobody is waiting for the outcome (the `Ticket` was dropped).
    fn is_orphaned(&self) -> bool;
}

pub(crate) struct OpJob<F, T, E> {
    op: F,
    reply: Reply<T, E>,
}

impl<F, T, E> OpJob<F, T, E> {
    pub(crate) fn new(op: F, reply: Reply<T, E>) -> Self {
        Self { op, reply }
    }
}

impl<F, Fut, T, E> Job for OpJob<F, T, E>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    fn start(self: Box<Self>, run: RunContext) {
        let OpJob { op, reply } = *self;
        tokio::spawn(run.execute(op, reply));
    }

    fn withdraw(self: Box<Self>, why: Withdrawn) {
        let _ = self.reply.send(Err(why.into()));
    }

    fn is_orphaned(&self) -> bool {
        self.reply.is_closed()
    }
}
