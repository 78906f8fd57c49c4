//! # Event subscribers for the admission queue.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`] fan-out
//! used to deliver [`Event`](crate::Event)s from the queue's [`Bus`](crate::events::Bus).
//!
//! ## Architecture
//! ```text
//! BoundedQueue / runner ── publish(Event) ──► Bus ──► subscriber_listener
//!                                                          │
//!                                                          ▼
//!                                                    SubscriberSet
//!                                               ┌─────────┼─────────┐
//!                                               ▼         ▼         ▼
//!                                          LogWriter   Metrics    Custom
//! ```

mod set;
mod subscriber;

#[cfg(feature = "logging")]
mod log;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
