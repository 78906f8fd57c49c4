use std::sync::Arc;
use std::time::Duration;

use std::net::SocketAddr;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tower::ServiceExt;

use taskgate::http::{
    AppState, GatewayConfig, GenerateOutput, GenerateRequest, Inference, UpstreamError, router,
};
use taskgate::{BoundedQueue, QueueConfig};

/// Answers according to the prompt.
struct Scripted {
    gate: Arc<Semaphore>,
}

#[async_trait::async_trait]
impl Inference for Scripted {
    async fn generate(&self, req: GenerateRequest) -> Result<GenerateOutput, UpstreamError> {
        match req.prompt.as_str() {
            "quota" => Err(UpstreamError::classify("429 RESOURCE_EXHAUSTED: quota")),
            "key" => Err(UpstreamError::classify("API key not valid")),
            "unsafe" => Err(UpstreamError::classify("Response blocked due to SAFETY")),
            "text" => Err(UpstreamError::TextOnly),
            "slow" => {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Err(UpstreamError::NoContent)
            }
            "gated" => {
                let _permit = self.gate.acquire().await;
                Ok(GenerateOutput {
                    mime_type: "image/png".into(),
                    data: "R0FURUQ=".into(),
                })
            }
            _ => Ok(GenerateOutput {
                mime_type: req.mime_type,
                data: req.image_data,
            }),
        }
    }
}

struct Harness {
    app: Router,
    state: Arc<AppState>,
    gate: Arc<Semaphore>,
}

fn harness(queue_cfg: QueueConfig, gw: GatewayConfig) -> Harness {
    let gate = Arc::new(Semaphore::new(0));
    let state = AppState::new(
        BoundedQueue::new(queue_cfg),
        Arc::new(Scripted {
            gate: Arc::clone(&gate),
        }),
        gw,
    );
    Harness {
        app: router(Arc::clone(&state)),
        state,
        gate,
    }
}

fn default_harness() -> Harness {
    harness(QueueConfig::default(), GatewayConfig::default())
}

fn generate(body: Value) -> Request<Body> {
    Request::post("/api/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// An anonymous request as it arrives from `peer` through `serve`.
fn generate_from(peer: &str, body: Value) -> Request<Body> {
    let addr: SocketAddr = peer.parse().unwrap();
    let mut req = generate(body);
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

fn body_for(prompt: &str) -> Value {
    json!({ "image_data": "aGVsbG8=", "mime_type": "image/png", "prompt": prompt, "user_id": "u1" })
}

async fn read_json(res: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_generate_success() {
    let h = default_harness();
    let res = h
        .app
        .clone()
        .oneshot(generate(json!({
            "imageData": "aGVsbG8=",
            "mimeType": "image/gif",
            "prompt": "clean"
        })))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-queue-position"], "1");
    assert_eq!(res.headers()["x-queue-running"], "0");
    assert_eq!(res.headers()["x-queue-max"], "10");
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    let body = read_json(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["result_data_url"], "data:image/jpeg;base64,aGVsbG8=");
    assert_eq!(h.state.queue().stats().total_processed, 1);
}

#[tokio::test]
async fn test_validation_errors_are_400() {
    let h = default_harness();
    let res = h
        .app
        .clone()
        .oneshot(generate(json!({ "image_data": "aGVsbG8=" })))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = read_json(res).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "missing prompt");
    assert_eq!(h.state.queue().stats().total_queued, 0);
}

#[tokio::test]
async fn test_client_rate_limit() {
    let h = harness(
        QueueConfig::default(),
        GatewayConfig {
            rate_limit: 2,
            ..GatewayConfig::default()
        },
    );
    for _ in 0..2 {
        let res = h.app.clone().oneshot(generate(body_for("ok"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    let res = h.app.clone().oneshot(generate(body_for("ok"))).await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

    let mut other = body_for("ok");
    other["user_id"] = json!("u2");
    let res = h.app.clone().oneshot(generate(other)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_anonymous_peers_have_separate_budgets() {
    let h = harness(
        QueueConfig::default(),
        GatewayConfig {
            rate_limit: 1,
            ..GatewayConfig::default()
        },
    );
    let anonymous = || {
        let mut body = body_for("ok");
        body["user_id"] = Value::Null;
        body
    };

    let res = h.app.clone().oneshot(generate_from("10.0.0.1:4000", anonymous())).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = h.app.clone().oneshot(generate_from("10.0.0.1:4001", anonymous())).await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

    let res = h.app.clone().oneshot(generate_from("10.0.0.2:4000", anonymous())).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(h.state.limiter().tracked(), 2);
}

#[tokio::test]
async fn test_malformed_body_uses_error_shape() {
    let h = default_harness();
    let req = Request::post("/api/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let res = h.app.clone().oneshot(req).await.unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = read_json(res).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().starts_with("malformed request body"));
    assert_eq!(h.state.queue().stats().total_queued, 0);
}

#[tokio::test]
async fn test_upstream_error_mapping() {
    let h = default_harness();
    for (prompt, status) in [
        ("quota", StatusCode::TOO_MANY_REQUESTS),
        ("key", StatusCode::FORBIDDEN),
        ("unsafe", StatusCode::BAD_REQUEST),
        ("text", StatusCode::INTERNAL_SERVER_ERROR),
    ] {
        let res = h.app.clone().oneshot(generate(body_for(prompt))).await.unwrap();
        assert_eq!(res.status(), status, "prompt {prompt}");
        assert!(res.headers().contains_key("x-queue-position"));
    }
    assert_eq!(h.state.queue().stats().total_errors, 4);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_504() {
    let h = harness(
        QueueConfig {
            timeout: Duration::from_millis(100),
            ..QueueConfig::default()
        },
        GatewayConfig::default(),
    );
    let res = h.app.clone().oneshot(generate(body_for("slow"))).await.unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(h.state.queue().stats().total_timeouts, 1);
}

#[tokio::test]
async fn test_full_queue_is_503_with_retry_after() {
    let h = harness(
        QueueConfig {
            max_concurrent: 1,
            max_queue_size: 1,
            ..QueueConfig::default()
        },
        GatewayConfig::default(),
    );

    let running = tokio::spawn(h.app.clone().oneshot(generate(body_for("gated"))));
    let waiting = tokio::spawn(h.app.clone().oneshot(generate(body_for("gated"))));
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let s = h.state.queue().stats();
            if s.running == 1 && s.queued == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("both requests admitted");

    let res = h.app.clone().oneshot(generate(body_for("gated"))).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.headers()[header::RETRY_AFTER], "30");
    assert_eq!(res.headers()["x-queue-position"], "2");
    let body = read_json(res).await;
    assert_eq!(body["retry_after"], 30);

    h.gate.add_permits(2);
    assert_eq!(running.await.unwrap().unwrap().status(), StatusCode::OK);
    assert_eq!(waiting.await.unwrap().unwrap().status(), StatusCode::OK);
    assert_eq!(h.state.queue().stats().total_rejected, 1);
}

#[tokio::test]
async fn test_status_and_health() {
    let h = default_harness();
    let res = h
        .app
        .clone()
        .oneshot(Request::get("/api/queue/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        read_json(res).await,
        json!({ "available": true, "position": 0, "estimatedWaitSec": 0 })
    );

    let res = h
        .app
        .clone()
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = read_json(res).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["queue"]["max_concurrent"], 10);
    assert_eq!(body["queue"]["waiting"], 0);
    assert!(body["timestamp"].is_string());
}
