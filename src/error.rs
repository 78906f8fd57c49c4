//! Error types used by the admission queue.
//!
//! This module defines two main error enums:
//!
//! - [`QueueError`]: the terminal outcome of a submission that did not succeed.
//! - [`RuntimeError`]: errors raised by the queue runtime itself (shutdown).
//!
//! Both types provide `as_label` for logs/metrics; [`QueueError::is_retryable`] tells
//! a caller whether backing off and resubmitting can help.

use std::time::Duration;
use thiserror::Error;

/// # Terminal failure of a submitted task.
///
/// `E` is the operation's own error type; it is passed through unchanged in
/// [`QueueError::Failed`]. Every other variant is produced by the queue.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum QueueError<E> {
    /// The waiting list was full; the operation was never invoked.
    #[error("queue full ({capacity} waiting)")]
    Full {
        /// Configured waiting-list capacity.
        capacity: usize,
    },

    /// The operation ran but did not settle within the time budget.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// The operation resolved with its own error.
    #[error("operation failed: {0}")]
    Failed(#[source] E),

    /// The operation panicked while running.
    #[error("operation panicked: {message}")]
    Panicked {
        /// The panic payload rendered as text.
        message: String,
    },

    /// The task was withdrawn before it started, or aborted by a forced shutdown.
    #[error("task cancelled")]
    Cancelled,

    /// The queue was shut down before the task could start.
    #[error("queue closed")]
    Closed,
}

impl<E> QueueError<E> {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskgate::QueueError;
    ///
    /// let err: QueueError<std::io::Error> = QueueError::Full { capacity: 200 };
    /// assert_eq!(err.as_label(), "queue_full");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::Full { .. } => "queue_full",
            QueueError::Timeout { .. } => "request_timeout",
            QueueError::Failed(_) => "operation_failed",
            QueueError::Panicked { .. } => "operation_panicked",
            QueueError::Cancelled => "task_cancelled",
            QueueError::Closed => "queue_closed",
        }
    }

    /// Indicates whether resubmitting later may succeed.
    ///
    /// Returns `true` for [`QueueError::Full`] and [`QueueError::Timeout`].
    /// Operation errors are opaque to the queue, so [`QueueError::Failed`] is `false`;
    /// use [`retry_when`](crate::retry_when) to classify them.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use taskgate::QueueError;
    ///
    /// let busy: QueueError<()> = QueueError::Timeout { timeout: Duration::from_secs(1) };
    /// assert!(busy.is_retryable());
    ///
    /// let failed: QueueError<()> = QueueError::Failed(());
    /// assert!(!failed.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueueError::Full { .. } | QueueError::Timeout { .. })
    }

    /// Returns the operation's own error, if that is what this is.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            QueueError::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Maps the operation error type, keeping queue-produced variants as they are.
    pub fn map_operation<F, E2>(self, f: F) -> QueueError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            QueueError::Full { capacity } => QueueError::Full { capacity },
            QueueError::Timeout { timeout } => QueueError::Timeout { timeout },
            QueueError::Failed(e) => QueueError::Failed(f(e)),
            QueueError::Panicked { message } => QueueError::Panicked { message },
            QueueError::Cancelled => QueueError::Cancelled,
            QueueError::Closed => QueueError::Closed,
        }
    }
}

/// Outcome of a task that was resolved by the queue without running its operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Withdrawn {
    Cancelled,
    Closed,
}

impl<E> From<Withdrawn> for QueueError<E> {
    fn from(w: Withdrawn) -> Self {
        match w {
            Withdrawn::Cancelled => QueueError::Cancelled,
            Withdrawn::Closed => QueueError::Closed,
        }
    }
}

/// # Errors produced by the queue runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; remaining work was aborted.
    #[error("shutdown grace {grace:?} exceeded; running={running} waiting={waiting}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Tasks still running when the grace period expired.
        running: usize,
        /// Tasks still waiting when the grace period expired.
        waiting: usize,
    },

    /// Installing the OS signal handler failed.
    #[error("failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskgate::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), running: 1, waiting: 0 };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signal(_) => "runtime_signal_failed",
        }
    }
}
