//! Invocation handler
//!
//! 每个网关只允许注册一个 handler，见 [`HandlerRegistry`]。
//! 常见写法：
//! - [`handler_fn`]：接收原始请求与上下文
//! - [`payload_fn`]：只接收原始请求，不解析会话标识
//! - [`json_handler`]：请求体反序列化为指定类型，返回值序列化为 JSON

pub mod adapters;
pub mod registry;

use std::fmt;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::context::InvocationContext;

pub use adapters::{handler_fn, json_handler, payload_fn, FnHandler, JsonHandler, PayloadHandler};
pub use registry::HandlerRegistry;

/// handler 执行失败
///
/// 默认映射为 500；handler 可以显式指定状态码。
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    status: Option<StatusCode>,
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// 携带明确 HTTP 状态码的错误
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        HandlerError::new(format!("{:#}", err))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::new(err.to_string())
    }
}

/// 原始请求
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    body: Bytes,
    content_type: Option<String>,
}

impl InvocationRequest {
    pub fn new(body: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            body: body.into(),
            content_type,
        }
    }

    /// JSON 请求
    pub fn json_body(value: &Value) -> Self {
        Self::new(value.to_string(), Some("application/json".to_string()))
    }

    /// 纯文本请求
    pub fn text_body(text: impl Into<String>) -> Self {
        Self::new(text.into(), Some("text/plain".to_string()))
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.starts_with("application/json") || ct.contains("+json"))
            .unwrap_or(false)
    }

    /// 请求体按 UTF-8 读取
    pub fn text(&self) -> Result<&str, HandlerError> {
        std::str::from_utf8(&self.body)
            .map_err(|e| HandlerError::new(format!("Request body is not UTF-8: {}", e)))
    }

    /// 请求体反序列化为指定类型
    ///
    /// 非 JSON 的纯文本请求体会作为 JSON 字符串再尝试一次，
    /// 因此 `String` 之类的目标类型也能接收 text/plain。
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        match serde_json::from_slice::<T>(&self.body) {
            Ok(value) => Ok(value),
            Err(json_err) => {
                let text = self.text()?;
                T::deserialize(Value::String(text.to_string())).map_err(|_| {
                    HandlerError::new(format!("Type conversion failed: {}", json_err))
                })
            }
        }
    }
}

/// handler 返回值
pub enum InvocationResponse {
    /// application/json
    Json(Value),
    /// text/plain
    Text(String),
    /// text/event-stream，每个元素一条事件；字符串原样输出，其它值输出 JSON
    Stream(BoxStream<'static, Result<Value, HandlerError>>),
}

impl InvocationResponse {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HandlerError> {
        Ok(InvocationResponse::Json(serde_json::to_value(value)?))
    }

    pub fn text(text: impl Into<String>) -> Self {
        InvocationResponse::Text(text.into())
    }

    /// 流式响应
    pub fn stream<S, T>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, HandlerError>> + Send + 'static,
        T: Serialize,
    {
        InvocationResponse::Stream(
            stream
                .map(|item| item.and_then(|value| Ok(serde_json::to_value(value)?)))
                .boxed(),
        )
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, InvocationResponse::Stream(_))
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            InvocationResponse::Json(_) => "json",
            InvocationResponse::Text(_) => "text",
            InvocationResponse::Stream(_) => "stream",
        }
    }
}

impl fmt::Debug for InvocationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationResponse::Json(value) => f.debug_tuple("Json").field(value).finish(),
            InvocationResponse::Text(text) => f.debug_tuple("Text").field(text).finish(),
            InvocationResponse::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// 注册到网关的唯一 handler
#[async_trait]
pub trait InvocationHandler: Send + Sync + 'static {
    async fn invoke(
        &self,
        request: InvocationRequest,
        context: InvocationContext,
    ) -> Result<InvocationResponse, HandlerError>;

    /// 为 false 时网关跳过会话标识解析
    fn accepts_context(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Prompt {
        prompt: String,
    }

    #[test]
    fn test_json_request() {
        let request = InvocationRequest::json_body(&serde_json::json!({"prompt": "hello"}));
        assert!(request.is_json());
        let prompt: Prompt = request.json().unwrap();
        assert_eq!(prompt.prompt, "hello");
    }

    #[test]
    fn test_text_request_into_string() {
        let request = InvocationRequest::text_body("plain prompt");
        assert!(!request.is_json());
        let text: String = request.json().unwrap();
        assert_eq!(text, "plain prompt");
    }

    #[test]
    fn test_conversion_failure() {
        let request = InvocationRequest::text_body("plain prompt");
        let err = request.json::<Prompt>().unwrap_err();
        assert!(err.message().starts_with("Type conversion failed"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_handler_error_status() {
        let err = HandlerError::with_status(StatusCode::BAD_REQUEST, "missing prompt");
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.to_string(), "missing prompt");
    }

    #[tokio::test]
    async fn test_stream_response_serializes_items() {
        #[derive(Serialize)]
        struct Chunk {
            id: u32,
        }

        let response = InvocationResponse::stream(futures::stream::iter(vec![
            Ok(Chunk { id: 1 }),
            Ok(Chunk { id: 2 }),
        ]));
        assert!(response.is_stream());

        let InvocationResponse::Stream(stream) = response else {
            panic!("expected stream");
        };
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].as_ref().unwrap(), &serde_json::json!({"id": 2}));
    }
}
