//! Queue core: admission, scheduling, execution and shutdown.
//!
//! Public API: [`BoundedQueue`], [`QueueBuilder`], [`Ticket`], [`SubmitOptions`],
//! [`Progress`].
//!
//! Internal modules:
//! - [`state`]: the synchronous state machine guarded by the queue mutex;
//! - [`job`]: type-erased waiting entries;
//! - [`runner`]: executes one task with timeout/cancellation and event publishing;
//! - [`progress`]: position broadcast to callbacks and watch channels;
//! - [`shutdown`]: cross-platform termination signals.

mod builder;
mod job;
mod progress;
mod queue;
mod runner;
pub(crate) mod shutdown;
mod state;
mod ticket;

pub use builder::QueueBuilder;
pub use progress::{Progress, ProgressFn, SubmitOptions};
pub use queue::BoundedQueue;
pub use ticket::Ticket;
