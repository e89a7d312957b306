use std::sync::Arc;
use std::time::Duration;

use agentcore_gate::{
    create_router, handler_fn, json_handler, payload_fn, HandlerError, HealthCheck, HealthState,
    InvocationContext, InvocationGate, InvocationRequest, InvocationResponse, RateLimitConfig,
    ThrottleScope,
};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use tower::ServiceExt;

const MAX_BODY: usize = 1024 * 1024;

fn limits(invocations: u32, ping: u32) -> RateLimitConfig {
    RateLimitConfig {
        invocations_limit: invocations,
        ping_limit: ping,
        window: Duration::from_secs(60),
        ..RateLimitConfig::default()
    }
}

fn echo_gate(rate_limit: RateLimitConfig) -> Arc<InvocationGate> {
    Arc::new(
        InvocationGate::builder()
            .rate_limit(rate_limit)
            .handler(handler_fn(
                |request: InvocationRequest, context: InvocationContext| async move {
                    let payload: Value = request.json()?;
                    Ok::<_, HandlerError>(InvocationResponse::Json(json!({
                        "echo": payload,
                        "conversation_id": context.conversation_id(),
                    })))
                },
            ))
            .unwrap()
            .build()
            .unwrap(),
    )
}

fn router(gate: &Arc<InvocationGate>) -> Router {
    create_router(gate.clone(), MAX_BODY, false)
}

fn post_json(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/invocations")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_ping() -> Request<Body> {
    Request::builder().uri("/ping").body(Body::empty()).unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

#[tokio::test]
async fn test_invocation_limit_rejects_third_request() {
    let gate = echo_gate(limits(2, 0));
    let app = router(&gate);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json(json!({"prompt": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(post_json(json!({"prompt": "hi"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Rate limit exceeded"})
    );

    // /ping 不受 /invocations 配额影响
    let response = app.clone().oneshot(get_ping()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(gate.task_tracker().current(), 0);
}

#[tokio::test]
async fn test_zero_limits_disable_throttling() {
    let gate = echo_gate(limits(0, 0));
    let app = router(&gate);

    for _ in 0..50 {
        let response = app
            .clone()
            .oneshot(post_json(json!("x")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(get_ping()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_ping_limit() {
    let gate = echo_gate(limits(0, 1));
    let app = router(&gate);

    assert_eq!(
        app.clone().oneshot(get_ping()).await.unwrap().status(),
        StatusCode::OK
    );
    assert_eq!(
        app.clone().oneshot(get_ping()).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_ping_body() {
    let gate = echo_gate(limits(0, 0));
    let before = chrono::Utc::now().timestamp();

    let response = router(&gate).oneshot(get_ping()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "Healthy");
    assert!(body["time_of_last_update"].as_i64().unwrap() >= before);
}

struct DownstreamDown;

#[async_trait]
impl HealthCheck for DownstreamDown {
    async fn check(&self) -> anyhow::Result<HealthState> {
        Ok(HealthState::Down("model endpoint unreachable".to_string()))
    }
}

#[tokio::test]
async fn test_unhealthy_ping_is_503() {
    let gate = Arc::new(
        InvocationGate::builder()
            .health_check(Arc::new(DownstreamDown))
            .handler(payload_fn(|_request: InvocationRequest| async move {
                Ok::<_, HandlerError>(InvocationResponse::text("ok"))
            }))
            .unwrap()
            .build()
            .unwrap(),
    );

    let response = router(&gate).oneshot(get_ping()).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "Unhealthy");
}

#[tokio::test]
async fn test_handler_error_is_500() {
    let gate = Arc::new(
        InvocationGate::builder()
            .handler(payload_fn(|_request: InvocationRequest| async move {
                Err::<InvocationResponse, _>(HandlerError::new("model unavailable"))
            }))
            .unwrap()
            .build()
            .unwrap(),
    );

    let response = router(&gate)
        .oneshot(post_json(json!({"prompt": "hi"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("model unavailable"));
    assert_eq!(gate.task_tracker().current(), 0);
}

#[tokio::test]
async fn test_handler_error_with_status() {
    let gate = Arc::new(
        InvocationGate::builder()
            .handler(payload_fn(|_request: InvocationRequest| async move {
                Err::<InvocationResponse, _>(HandlerError::with_status(
                    StatusCode::BAD_REQUEST,
                    "missing prompt",
                ))
            }))
            .unwrap()
            .build()
            .unwrap(),
    );

    let response = router(&gate).oneshot(post_json(json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_identity_from_bearer_and_session() {
    let gate = echo_gate(limits(0, 0));
    let token = format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
        URL_SAFE_NO_PAD.encode(r#"{"sub":"user-123"}"#)
    );

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header("X-Amzn-Bedrock-AgentCore-Runtime-Session-Id", "session-abc")
        .body(Body::from(r#"{"prompt":"hi"}"#))
        .unwrap();

    let body = body_json(router(&gate).oneshot(request).await.unwrap()).await;
    assert_eq!(body["conversation_id"], "user-123:session-abc");
    assert_eq!(body["echo"]["prompt"], "hi");
}

#[tokio::test]
async fn test_text_response() {
    let gate = Arc::new(
        InvocationGate::builder()
            .handler(payload_fn(|request: InvocationRequest| async move {
                Ok::<_, HandlerError>(InvocationResponse::text(request.text()?.to_uppercase()))
            }))
            .unwrap()
            .build()
            .unwrap(),
    );

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("hello"))
        .unwrap();
    let response = router(&gate).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(body_string(response).await, "HELLO");
}

#[tokio::test]
async fn test_json_handler_accepts_plain_text() {
    let gate = Arc::new(
        InvocationGate::builder()
            .handler(json_handler(|prompt: String, _context| async move {
                Ok::<_, HandlerError>(json!({ "length": prompt.len() }))
            }))
            .unwrap()
            .build()
            .unwrap(),
    );

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("four"))
        .unwrap();
    let response = router(&gate).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"length": 4}));
}

#[tokio::test]
async fn test_streaming_response() {
    let gate = Arc::new(
        InvocationGate::builder()
            .handler(payload_fn(|_request: InvocationRequest| async move {
                Ok::<_, HandlerError>(InvocationResponse::stream(futures::stream::iter(vec![
                    Ok::<_, HandlerError>(json!("hello")),
                    Ok(json!({"n": 1})),
                ])))
            }))
            .unwrap()
            .build()
            .unwrap(),
    );

    let response = router(&gate)
        .oneshot(post_json(json!({"stream": true})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = body_string(response).await;
    assert!(body.contains("data: hello\n"));
    assert!(body.contains(r#"data: {"n":1}"#));
    assert_eq!(gate.task_tracker().current(), 0);
}

#[tokio::test]
async fn test_client_scope_uses_forwarded_for() {
    let gate = echo_gate(RateLimitConfig {
        scope: ThrottleScope::Client,
        ..limits(1, 0)
    });
    let app = router(&gate);

    let from = |client: &str| {
        Request::builder()
            .method("POST")
            .uri("/invocations")
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Forwarded-For", client)
            .body(Body::from("{}"))
            .unwrap()
    };

    assert_eq!(
        app.clone().oneshot(from("10.0.0.1")).await.unwrap().status(),
        StatusCode::OK
    );
    assert_eq!(
        app.clone().oneshot(from("10.0.0.2")).await.unwrap().status(),
        StatusCode::OK
    );
    assert_eq!(
        app.clone().oneshot(from("10.0.0.1")).await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_metrics_route_disabled_by_default() {
    let gate = echo_gate(limits(0, 0));
    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = router(&gate).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let gate = echo_gate(limits(0, 0));
    let app = create_router(gate.clone(), 16, false);

    let response = app
        .oneshot(post_json(json!({"prompt": "this body is longer than sixteen bytes"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(gate.task_tracker().current(), 0);
}

#[tokio::test]
async fn test_throttle_runs_before_body_read() {
    let gate = echo_gate(limits(1, 0));
    let app = create_router(gate.clone(), 16, false);

    let response = app.clone().oneshot(post_json(json!(1))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // 配额已用完：即使请求体超限也返回 429，而不是读取请求体后的 400
    let oversized = json!({ "prompt": "x".repeat(1000) });
    let response = app.clone().oneshot(post_json(oversized)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body_json(response).await,
        json!({"error": "Rate limit exceeded"})
    );
    assert_eq!(gate.task_tracker().current(), 0);
}
