//! # Execute one admitted task in its running slot.
//!
//! [`RunContext::execute`] runs the operation with the queue's timeout, settles the
//! slot, publishes lifecycle events to the [`Bus`](crate::events::Bus) and delivers
//! the outcome to the caller.
//!
//! ## Flow
//! ```text
//! spawn(op(child_token))
//!     │
//!     ├─ Ok(v)            → TaskSucceeded  → Ok(v)
//!     ├─ Err(e)           → TaskFailed     → Failed(e)
//!     ├─ panic            → TaskFailed     → Panicked
//!     ├─ timeout fired    → TimeoutHit + TaskFailed → Timeout
//!     │                     Cancel: cancel token, abort op
//!     │                     Detach: op keeps running, tracked as abandoned
//!     └─ runtime aborted  → TaskFailed     → Cancelled
//!
//! then: release slot + stats → reply to caller → schedule next → re-broadcast positions
//! ```
//!
//! ## Rules
//! - Exactly **one** terminal event and **one** reply per started task.
//! - The slot is released when the timeout fires, not when a detached op settles.
//! - Stats are updated **before** the reply is sent, so a caller that observes its
//!   outcome also observes it in `stats()`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::{JoinError, JoinHandle};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::TimeoutAction;
use crate::error::QueueError;
use crate::subscribers::panic_message;

use super::job::Reply;
use super::progress::ProgressSink;
use super::queue::Inner;
use super::state::Settled;

/// A granted running slot.
pub(crate) struct RunContext {
    pub(crate) queue: Arc<Inner>,
    pub(crate) id: u64,
    pub(crate) sink: Arc<ProgressSink>,
}

enum Attempt<T, E> {
    Joined(Result<Result<T, E>, JoinError>),
    TimedOut(Duration),
    Aborted,
}

impl RunContext {
    pub(crate) async fn execute<F, Fut, T, E>(self, op: F, reply: Reply<T, E>)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let token = self.queue.runtime.child_token();
        let op_token = token.clone();
        let started = Instant::now();
        let mut handle = tokio::spawn(async move { op(op_token).await });

        let attempt = tokio::select! {
            biased;
            joined = &mut handle => Attempt::Joined(joined),
            dur = expire(self.queue.cfg.task_timeout()) => Attempt::TimedOut(dur),
            _ = self.queue.runtime.cancelled() => Attempt::Aborted,
        };
        let elapsed = started.elapsed();

        let (settled, result) = match attempt {
            Attempt::Joined(Ok(Ok(v))) => (Settled::Succeeded(elapsed), Ok(v)),
            Attempt::Joined(Ok(Err(e))) => (Settled::Failed, Err(QueueError::Failed(e))),
            Attempt::Joined(Err(err)) if err.is_panic() => {
                let message = panic_message(err.into_panic().as_ref());
                (Settled::Failed, Err(QueueError::Panicked { message }))
            }
            Attempt::Joined(Err(_)) => (Settled::Failed, Err(QueueError::Cancelled)),
            Attempt::TimedOut(timeout) => {
                self.on_timeout(handle, &token, started);
                (Settled::TimedOut, Err(QueueError::Timeout { timeout }))
            }
            Attempt::Aborted => {
                handle.abort();
                (Settled::Failed, Err(QueueError::Cancelled))
            }
        };

        self.queue
            .settle(self.id, &self.sink, settled, elapsed, failure_reason(&result));
        let _ = reply.send(result);
        self.queue.pump(true);
    }

    fn on_timeout<R: Send + 'static>(
        &self,
        handle: JoinHandle<R>,
        token: &CancellationToken,
        started: Instant,
    ) {
        match self.queue.cfg.timeout_action {
            TimeoutAction::Cancel => {
                token.cancel();
                handle.abort();
            }
            TimeoutAction::Detach => {
                self.queue.abandon();
                let queue = Arc::clone(&self.queue);
                let id = self.id;
                tokio::spawn(async move {
                    let _ = handle.await;
                    queue.abandoned_settled(id, started.elapsed());
                });
            }
        }
    }
}

/// Resolves after `timeout`, or never when there is none.
async fn expire(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(dur) => {
            time::sleep(dur).await;
            dur
        }
        None => std::future::pending().await,
    }
}

/// Text for the `TaskFailed` event; `None` on success.
fn failure_reason<T, E>(result: &Result<T, QueueError<E>>) -> Option<String> {
    match result {
        Ok(_) => None,
        Err(QueueError::Panicked { message }) => Some(format!("panicked: {message}")),
        Err(QueueError::Timeout { timeout }) => Some(format!("timed out after {timeout:?}")),
        Err(e) => Some(e.as_label().to_string()),
    }
}
