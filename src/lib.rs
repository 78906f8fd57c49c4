//! # taskgate
//!
//! **Taskgate** is a bounded admission queue for async operations that call a slow,
//! rate-limited upstream (an inference API, a payment provider, a legacy backend).
//!
//! It caps how many operations run at once, keeps a bounded FIFO of waiting callers,
//! refuses excess load immediately instead of letting it pile up, applies a per-task
//! timeout and reports every waiting caller's live position.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   caller #1        caller #2        caller #3 ... caller #N
//!      │                │                │
//!      ▼                ▼                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  BoundedQueue                                                     │
//! │  - QueueState (running, waiting FIFO, counters) behind one mutex  │
//! │  - Bus (broadcast events)                                         │
//! │  - runtime token (forced shutdown)                                │
//! └──────┬──────────────────┬──────────────────┬──────────────┬──────┘
//!        ▼                  ▼                  ▼              │
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐        │
//!   │ running  │       │ running  │       │ waiting  │ ...    │
//!   │  slot 1  │       │  slot 2  │       │ #1 of M  │        │
//!   └────┬─────┘       └────┬─────┘       └────┬─────┘        │
//!        │ TaskStarting     │ TaskSucceeded    │ TaskQueued   │
//!        │ TimeoutHit       │ TaskFailed       │ TaskCancelled│
//!        ▼                  ▼                  ▼              ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                  (capacity: QueueConfig::bus_capacity)            │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                            (per-sub queues)
//!                        ┌──────────┼──────────┐
//!                        ▼          ▼          ▼
//!                     worker1    worker2    workerN
//! ```
//!
//! ### Lifecycle of one submission
//! ```text
//! submit(op)
//!   ├─ waiting list full ─► TaskRejected ─► Err(Full)          (op never invoked)
//!   └─ admitted ─► TaskQueued ─► positions re-broadcast
//!        │
//!        ├─ caller cancels / drops ticket ─► TaskCancelled ─► Err(Cancelled)
//!        │
//!        └─ reaches head and a slot is free ─► TaskStarting
//!             ├─ Ok(v)         ─► TaskSucceeded ─► Ok(v)
//!             ├─ Err(e)/panic  ─► TaskFailed    ─► Err(Failed(e) | Panicked)
//!             └─ timeout fires ─► TimeoutHit + TaskFailed ─► Err(Timeout)
//!        then: slot released ─► next head starts ─► positions re-broadcast
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Queue**         | Admission, FIFO, concurrency ceiling, timeout, shutdown.     | [`BoundedQueue`], [`Ticket`]                |
//! | **Progress**      | Live queue position via callback or `watch` channel.         | [`SubmitOptions`], [`Progress`]             |
//! | **Stats**         | Counters, gauges, advisory wait estimate.                    | [`QueueStats`], [`QueueStatus`]             |
//! | **Subscriber API**| Hook into queue events (logging, metrics, custom).           | [`Subscribe`], [`Event`]                    |
//! | **Policies**      | Caller-side retry with backoff and jitter.                   | [`RetryPolicy`], [`BackoffPolicy`]          |
//! | **Errors**        | Typed terminal outcomes and runtime errors.                  | [`QueueError`], [`RuntimeError`]            |
//! | **Configuration** | Queue sizing and timeouts, deserializable.                   | [`QueueConfig`]                             |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] subscriber rendering events via `tracing`.
//! - `http`: an axum gateway (`/api/generate`, `/api/queue/status`, `/api/health`) that
//!   puts an [`http::Inference`] backend behind a queue.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use taskgate::{BoundedQueue, QueueConfig, QueueError, SubmitOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = QueueConfig {
//!         max_concurrent: 2,
//!         timeout: Duration::from_secs(5),
//!         ..QueueConfig::default()
//!     };
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn taskgate::Subscribe>> = vec![Arc::new(taskgate::LogWriter::default())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn taskgate::Subscribe>> = Vec::new();
//!
//!     let queue = BoundedQueue::builder(cfg).with_subscribers(subs).build();
//!
//!     let opts = SubmitOptions::new().on_progress(|p| {
//!         println!("waiting: #{} of {}", p.position, p.total);
//!     });
//!     let reply: Result<String, QueueError<std::io::Error>> = queue
//!         .submit_with(|_ctx| async { Ok("hello".to_string()) }, opts)
//!         .await;
//!     println!("{}", reply?);
//!
//!     queue.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod events;
mod policies;
mod stats;
mod subscribers;

#[cfg(feature = "http")]
pub mod http;

// ---- Public re-exports ----

pub use config::{QueueConfig, TimeoutAction};
pub use core::{BoundedQueue, Progress, ProgressFn, QueueBuilder, SubmitOptions, Ticket};
pub use error::{QueueError, RuntimeError};
pub use events::{Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy, retry, retry_when};
pub use stats::{QueuePosition, QueueStats, QueueStatus};
pub use subscribers::Subscribe;

// Optional: a built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
