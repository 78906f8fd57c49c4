//! # HTTP gateway in front of a queue.
//!
//! Puts an [`Inference`] backend behind a [`BoundedQueue`] and exposes it over axum.
//!
//! ## Routes
//! ```text
//! POST /api/generate      rate limit ─► validate ─► submit ─► { success, result_data_url }
//! GET  /api/queue/status  advisory { available, position, estimatedWaitSec }
//! GET  /api/health        { status, timestamp, queue: { running, waiting, ... } }
//! ```
//!
//! ## Status codes of `/api/generate`
//! | Outcome                           | Status |
//! |-----------------------------------|--------|
//! | success                           | 200    |
//! | malformed body, validation failed | 400    |
//! | upstream safety filter            | 400    |
//! | upstream rejected credentials     | 403    |
//! | client or upstream rate limited   | 429    |
//! | other upstream failure / panic    | 500    |
//! | queue full (`Retry-After`)        | 503    |
//! | queue shutting down               | 503    |
//! | timeout                           | 504    |
//!
//! Every response that reached the queue carries `X-Queue-Position`,
//! `X-Queue-Running` and `X-Queue-Max`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskgate::{BoundedQueue, QueueConfig};
//! use taskgate::http::{AppState, GatewayConfig, GenerateOutput, GenerateRequest, Inference, UpstreamError};
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl Inference for Echo {
//!     async fn generate(&self, req: GenerateRequest) -> Result<GenerateOutput, UpstreamError> {
//!         Ok(GenerateOutput { mime_type: req.mime_type, data: req.image_data })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let queue = BoundedQueue::new(QueueConfig::default());
//!     let state = AppState::new(queue, Arc::new(Echo), GatewayConfig::default());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3001").await?;
//!     taskgate::http::serve(listener, state).await
//! }
//! ```

mod config;
mod handlers;
mod inference;
mod rate_limit;
mod validate;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, header},
    middleware,
    response::Response,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::core::{BoundedQueue, shutdown};

pub use config::GatewayConfig;
pub use handlers::{ApiError, GenerateResponse};
pub use inference::{GenerateOutput, GenerateRequest, Inference, UpstreamError};
pub use rate_limit::{RateLimited, RateLimiter};
pub use validate::ValidationError;

/// Shared state of the gateway.
pub struct AppState {
    pub(crate) queue: BoundedQueue,
    pub(crate) inference: Arc<dyn Inference>,
    pub(crate) limiter: RateLimiter,
    pub(crate) cfg: GatewayConfig,
    request_seq: AtomicU64,
}

impl AppState {
    /// Wires a queue and a backend together.
    pub fn new(
        queue: BoundedQueue,
        inference: Arc<dyn Inference>,
        cfg: GatewayConfig,
    ) -> Arc<Self> {
        let limiter = RateLimiter::new(cfg.rate_limit, cfg.rate_window);
        Arc::new(Self {
            queue,
            inference,
            limiter,
            cfg,
            request_seq: AtomicU64::new(0),
        })
    }

    /// The queue requests are submitted to.
    pub fn queue(&self) -> &BoundedQueue {
        &self.queue
    }

    /// The per-client rate limiter.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub(crate) fn next_request_id(&self) -> u64 {
        self.request_seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Builds the gateway router.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.cfg.body_limit;
    Router::new()
        .route("/api/generate", post(handlers::generate))
        .route("/api/queue/status", get(handlers::queue_status))
        .route("/api/health", get(handlers::health))
        .layer(middleware::map_response(security_headers))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn security_headers(mut res: Response) -> Response {
    let headers = res.headers_mut();
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    res
}

/// Serves the gateway until SIGINT/SIGTERM, then drains the queue.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    serve_with_shutdown(listener, state, async {
        match shutdown::wait_for_shutdown_signal().await {
            Ok(signal) => tracing::info!(target: "taskgate", signal, "shutdown signal received"),
            Err(e) => {
                tracing::error!(target: "taskgate", error = %e, "cannot listen for shutdown signals");
                std::future::pending::<()>().await;
            }
        }
    })
    .await
}

/// Serves the gateway until `signal` resolves, then drains the queue.
///
/// In-flight requests are allowed to finish; the queue then gets its configured grace.
pub async fn serve_with_shutdown<S>(
    listener: TcpListener,
    state: Arc<AppState>,
    signal: S,
) -> anyhow::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .context("listener has no local address")?;
    let stop = CancellationToken::new();
    spawn_sweeper(Arc::clone(&state), stop.clone());

    tracing::info!(target: "taskgate", %addr, "gateway listening");
    let app = router(Arc::clone(&state)).into_make_service_with_connect_info::<SocketAddr>();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await;
    stop.cancel();
    served.context("http server failed")?;

    state
        .queue
        .shutdown()
        .await
        .context("queue did not drain within grace")?;
    tracing::info!(target: "taskgate", "gateway stopped");
    Ok(())
}

/// Periodically forgets idle rate-limit clients.
fn spawn_sweeper(state: Arc<AppState>, stop: CancellationToken) {
    let every = state.cfg.sweep_interval.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.tick().await;
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tick.tick() => {
                    let forgotten = state.limiter.sweep();
                    if forgotten > 0 {
                        tracing::debug!(target: "taskgate", forgotten, "rate limiter sweep");
                    }
                }
            }
        }
    });
}
