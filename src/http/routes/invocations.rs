//! Invocation 路由
//!
//! 路由：POST /invocations
//!
//! 响应格式由 handler 的返回值决定：
//! - JSON → `application/json`
//! - 文本 → `text/plain`
//! - 流 → `text/event-stream`，字符串元素原样输出，其它元素输出 JSON

use std::convert::Infallible;

use axum::{
    body::to_bytes,
    extract::{Request, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::post,
    Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::error;

use crate::error::{GateError, Result};
use crate::handler::{InvocationRequest, InvocationResponse};
use crate::http::client::client_key_of;
use crate::http::HttpServerState;
use crate::throttle::EndpointCategory;

/// 创建 invocation 路由
pub fn create_route() -> Router<HttpServerState> {
    Router::new().route(EndpointCategory::INVOCATIONS_PATH, post(invoke))
}

async fn invoke(State(state): State<HttpServerState>, request: Request) -> Result<Response> {
    let client_id = client_key_of(&request);
    // 先限流，被拒绝的请求不读取请求体
    state
        .gate
        .admit(EndpointCategory::Invocations, &client_id)?;
    let (parts, body) = request.into_parts();

    let body = to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| GateError::BadRequest(format!("无法读取请求体: {}", e)))?;
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let response = state
        .gate
        .dispatch(
            &client_id,
            parts.headers,
            InvocationRequest::new(body, content_type),
        )
        .await?;

    Ok(into_http_response(response))
}

fn into_http_response(response: InvocationResponse) -> Response {
    match response {
        InvocationResponse::Json(value) => Json(value).into_response(),
        InvocationResponse::Text(text) => {
            ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response()
        }
        InvocationResponse::Stream(stream) => {
            let events = stream.map(|item| Ok::<_, Infallible>(to_event(item)));
            Sse::new(events)
                .keep_alive(KeepAlive::default())
                .into_response()
        }
    }
}

fn to_event(item: std::result::Result<Value, crate::handler::HandlerError>) -> Event {
    match item {
        Ok(Value::String(text)) => Event::default().data(strip_carriage_returns(&text)),
        Ok(value) => Event::default().data(value.to_string()),
        Err(e) => {
            error!("❌ 流式响应中断: {}", e);
            Event::default()
                .event("error")
                .data(json!({ "error": e.message() }).to_string())
        }
    }
}

/// SSE data 不允许出现 `\r`
fn strip_carriage_returns(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_carriage_returns() {
        assert_eq!(strip_carriage_returns("a\r\nb\rc"), "a\nb\nc");
    }
}
