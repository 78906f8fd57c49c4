use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::{
    config::QueueConfig,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};

use super::queue::{BoundedQueue, Inner};

/// Builder for a [`BoundedQueue`] with event subscribers.
///
/// ```rust
/// use std::sync::Arc;
/// use taskgate::{BoundedQueue, QueueConfig, Subscribe};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let subs: Vec<Arc<dyn Subscribe>> = Vec::new();
///     let queue = BoundedQueue::builder(QueueConfig::default())
///         .with_subscribers(subs)
///         .build();
///     assert_eq!(queue.stats().running, 0);
/// }
/// ```
pub struct QueueBuilder {
    cfg: QueueConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl QueueBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: QueueConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive queue events (admission, start, settle, shutdown)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the queue.
    ///
    /// With subscribers attached this spawns the event listener and the subscriber
    /// workers, so it must then be called from within a Tokio runtime.
    pub fn build(self) -> BoundedQueue {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let inner = Arc::new(Inner::new(self.cfg, bus.clone()));

        if !self.subscribers.is_empty() {
            let set = SubscriberSet::new(self.subscribers, bus.clone());
            subscriber_listener(&bus, set, inner.lifetime.clone());
        }
        BoundedQueue::from_inner(inner)
    }
}

/// Forwards bus events to the subscriber set until the queue is dropped.
fn subscriber_listener(bus: &Bus, set: SubscriberSet, lifetime: CancellationToken) {
    let mut rx = bus.subscribe();
    tracing::debug!(target: "taskgate", subscribers = set.len(), "subscriber listener started");
    tokio::spawn(async move {
        loop {
            let ev = tokio::select! {
                biased;
                ev = rx.recv() => ev,
                _ = lifetime.cancelled() => break,
            };
            match ev {
                Ok(ev) => set.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "taskgate", skipped, "event listener lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
        set.shutdown().await;
    });
}
