//! # Per-client sliding-window rate limit.
//!
//! Each client keeps the timestamps of its accepted requests inside the window.
//! A request is refused once the client already has `limit` of them. Clients with
//! no request inside the window are dropped by [`RateLimiter::sweep`], which the
//! gateway runs periodically.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

/// A client exceeded its request budget.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("rate limit exceeded ({limit} requests per {} minutes)", .window.as_secs() / 60)]
pub struct RateLimited {
    /// Requests allowed per window.
    pub limit: usize,
    /// Window length.
    pub window: Duration,
}

/// Sliding-window limiter keyed by client id.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Allows `limit` requests per client within any `window`.
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a request from `client`, or refuses it.
    ///
    /// Refused requests are not recorded.
    pub fn check(&self, client: &str) -> Result<(), RateLimited> {
        let now = Instant::now();
        let mut clients = self.lock();
        let stamps = clients.entry(client.to_string()).or_default();
        while stamps
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            stamps.pop_front();
        }
        if stamps.len() >= self.limit {
            return Err(RateLimited {
                limit: self.limit,
                window: self.window,
            });
        }
        stamps.push_back(now);
        Ok(())
    }

    /// Drops expired timestamps and forgets idle clients; returns how many were forgotten.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, stamps| {
            stamps.retain(|t| now.duration_since(*t) < self.window);
            !stamps.is_empty()
        });
        before - clients.len()
    }

    /// Number of clients currently tracked.
    pub fn tracked(&self) -> usize {
        self.lock().len()
    }
}
