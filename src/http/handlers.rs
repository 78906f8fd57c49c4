//! Route handlers and the error-to-status mapping.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json,
    extract::{ConnectInfo, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::error::QueueError;
use crate::stats::{QueueStats, QueueStatus};

use super::AppState;
use super::inference::{GenerateRequest, UpstreamError};
use super::rate_limit::RateLimited;
use super::validate::{ValidationError, validate};

/// Client id used when a request carries no `user_id` and the peer address is unknown.
const ANONYMOUS: &str = "anonymous";

const X_QUEUE_POSITION: HeaderName = HeaderName::from_static("x-queue-position");
const X_QUEUE_RUNNING: HeaderName = HeaderName::from_static("x-queue-running");
const X_QUEUE_MAX: HeaderName = HeaderName::from_static("x-queue-max");

/// A failed gateway request, rendered as `{ "success": false, "error": ... }`.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ApiError {
    /// The client exceeded its request budget (429).
    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    /// The request failed validation (400).
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The waiting list is full (503 with `Retry-After`).
    #[error("all processing slots are busy, retry in {retry_after} seconds")]
    QueueFull {
        /// Suggested delay in seconds.
        retry_after: u64,
    },

    /// Generation did not finish within the queue timeout (504).
    #[error("processing timed out after {} seconds", .timeout.as_secs())]
    Timeout {
        /// The exceeded budget.
        timeout: Duration,
    },

    /// The queue is shutting down (503).
    #[error("service unavailable: {0}")]
    Unavailable(&'static str),

    /// The upstream failed; status depends on the kind.
    #[error(transparent)]
    Upstream(UpstreamError),

    /// Unexpected failure (500). The detail is logged, not returned.
    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Invalid(_) => StatusCode::BAD_REQUEST,
            ApiError::QueueFull { .. } | ApiError::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Upstream(UpstreamError::RateLimited(_)) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(UpstreamError::Unauthorized(_)) => StatusCode::FORBIDDEN,
            ApiError::Upstream(UpstreamError::SafetyBlocked(_)) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn from_queue(err: QueueError<UpstreamError>, retry_after: u64) -> Self {
        match err {
            QueueError::Full { .. } => ApiError::QueueFull { retry_after },
            QueueError::Timeout { timeout } => ApiError::Timeout { timeout },
            QueueError::Failed(e) => ApiError::Upstream(e),
            QueueError::Panicked { message } => ApiError::Internal(message),
            QueueError::Cancelled => ApiError::Unavailable("request cancelled"),
            QueueError::Closed => ApiError::Unavailable("shutting down"),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = match &self {
            ApiError::QueueFull { retry_after } => Some(*retry_after),
            _ => None,
        };
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
            retry_after,
        };
        let mut res = (self.status(), Json(body)).into_response();
        if let Some(secs) = retry_after {
            res.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        res
    }
}

/// Successful generate response.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    /// Always `true`.
    pub success: bool,
    /// `data:` URL of the generated image.
    pub result_data_url: String,
}

/// Queue depth as seen by a request about to be submitted.
fn queue_headers(stats: &QueueStats) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(3);
    headers.insert(X_QUEUE_POSITION, HeaderValue::from(stats.queued + 1));
    headers.insert(X_QUEUE_RUNNING, HeaderValue::from(stats.running));
    headers.insert(X_QUEUE_MAX, HeaderValue::from(stats.max_concurrent));
    headers
}

/// Rate-limit key: the caller's `user_id`, else its peer IP.
fn client_key(req: &GenerateRequest, peer: Option<SocketAddr>) -> String {
    match (req.user_id.as_deref().filter(|id| !id.is_empty()), peer) {
        (Some(id), _) => id.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => ANONYMOUS.to_string(),
    }
}

/// `POST /api/generate`
pub(crate) async fn generate(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Response {
    let request_id = state.next_request_id();
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::info!(target: "taskgate", request_id, reason = %rejection, "malformed body");
            return ApiError::from(ValidationError::Malformed(rejection.body_text()))
                .into_response();
        }
    };
    let client = client_key(&req, peer.map(|ConnectInfo(addr)| addr));

    if let Err(e) = state.limiter.check(&client) {
        tracing::info!(target: "taskgate", request_id, client = %client, "rate limited");
        return ApiError::from(e).into_response();
    }
    let req = match validate(req, &state.cfg) {
        Ok(req) => req,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let stats = state.queue.stats();
    tracing::info!(
        target: "taskgate",
        request_id,
        waiting = stats.queued,
        running = stats.running,
        max = stats.max_concurrent,
        "entering queue"
    );
    let headers = queue_headers(&stats);

    let inference = Arc::clone(&state.inference);
    let started = Instant::now();
    let outcome = state
        .queue
        .submit(move |_ctx| async move { inference.generate(req).await })
        .await;

    let body = match outcome {
        Ok(output) => {
            tracing::info!(
                target: "taskgate",
                request_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "generation finished"
            );
            Json(GenerateResponse {
                success: true,
                result_data_url: output.data_url(),
            })
            .into_response()
        }
        Err(err) => {
            tracing::warn!(
                target: "taskgate",
                request_id,
                label = err.as_label(),
                error = %err,
                "generation failed"
            );
            ApiError::from_queue(err, state.cfg.retry_after_secs).into_response()
        }
    };
    (headers, body).into_response()
}

/// `GET /api/queue/status`
pub(crate) async fn queue_status(State(state): State<Arc<AppState>>) -> Json<QueueStatus> {
    Json(state.queue.status())
}

#[derive(Serialize)]
pub(crate) struct Health {
    status: &'static str,
    timestamp: String,
    queue: HealthQueue,
}

#[derive(Serialize)]
struct HealthQueue {
    running: usize,
    waiting: usize,
    max_concurrent: usize,
    total_processed: u64,
    total_errors: u64,
    avg_processing_time_ms: u64,
}

/// `GET /api/health`
pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    let s = state.queue.stats();
    Json(Health {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
        queue: HealthQueue {
            running: s.running,
            waiting: s.queued,
            max_concurrent: s.max_concurrent,
            total_processed: s.total_processed,
            total_errors: s.total_errors,
            avg_processing_time_ms: s.avg_processing_ms,
        },
    })
}
