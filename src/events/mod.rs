//! Queue events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the admission queue, its runners,
//! the shutdown path and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `BoundedQueue` (admission, cancel, shutdown), `core::runner`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the subscriber listener (fans out to `SubscriberSet`) and
//!   [`BoundedQueue::subscribe_events`](crate::BoundedQueue::subscribe_events) receivers.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
