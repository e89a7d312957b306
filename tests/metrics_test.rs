//! 指标测试：安装全局 Recorder，单独放在一个测试二进制中

use std::sync::Arc;

use agentcore_gate::infra::metrics;
use agentcore_gate::{
    create_router, payload_fn, HandlerError, InvocationGate, InvocationRequest, InvocationResponse,
};
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

/// 从 Prometheus 文本中读取无标签指标的值
fn gauge_value(rendered: &str, name: &str) -> Option<f64> {
    rendered.lines().find_map(|line| {
        let value = line.strip_prefix(name)?.strip_prefix(' ')?;
        value.trim().parse().ok()
    })
}

#[tokio::test]
async fn test_inflight_gauge_follows_task_lifecycle() {
    metrics::init().unwrap();

    let gate = Arc::new(
        InvocationGate::builder()
            .handler(payload_fn(|_request: InvocationRequest| async move {
                // handler 执行期间读取当前指标
                let rendered = metrics::render_metrics().unwrap_or_default();
                Ok::<_, HandlerError>(InvocationResponse::text(rendered))
            }))
            .unwrap()
            .build()
            .unwrap(),
    );
    let app = create_router(gate.clone(), 1024, true);

    let request = Request::builder()
        .method("POST")
        .uri("/invocations")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("hi"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let during = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(gauge_value(&during, "agentcore_tasks_inflight"), Some(1.0));

    assert_eq!(gate.task_tracker().current(), 0);

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let after = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(gauge_value(&after, "agentcore_tasks_inflight"), Some(0.0));
    assert!(after.contains("agentcore_invocations_total"));
}
