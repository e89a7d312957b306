//! 闭包 → [`InvocationHandler`]

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{HandlerError, InvocationHandler, InvocationRequest, InvocationResponse};
use crate::context::InvocationContext;

/// 接收原始请求与上下文的 handler
pub struct FnHandler<F> {
    f: F,
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(InvocationRequest, InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<InvocationResponse, HandlerError>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> InvocationHandler for FnHandler<F>
where
    F: Fn(InvocationRequest, InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<InvocationResponse, HandlerError>> + Send + 'static,
{
    async fn invoke(
        &self,
        request: InvocationRequest,
        context: InvocationContext,
    ) -> Result<InvocationResponse, HandlerError> {
        (self.f)(request, context).await
    }
}

/// 只接收请求体的 handler，网关不为它解析会话标识
pub struct PayloadHandler<F> {
    f: F,
}

pub fn payload_fn<F, Fut>(f: F) -> PayloadHandler<F>
where
    F: Fn(InvocationRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<InvocationResponse, HandlerError>> + Send + 'static,
{
    PayloadHandler { f }
}

#[async_trait]
impl<F, Fut> InvocationHandler for PayloadHandler<F>
where
    F: Fn(InvocationRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<InvocationResponse, HandlerError>> + Send + 'static,
{
    async fn invoke(
        &self,
        request: InvocationRequest,
        _context: InvocationContext,
    ) -> Result<InvocationResponse, HandlerError> {
        (self.f)(request).await
    }

    fn accepts_context(&self) -> bool {
        false
    }
}

/// 强类型 handler：请求体反序列化为 `Req`，返回的 `Resp` 序列化为 JSON
pub struct JsonHandler<F, Req, Resp> {
    f: F,
    _types: PhantomData<fn(Req) -> Resp>,
}

pub fn json_handler<F, Fut, Req, Resp>(f: F) -> JsonHandler<F, Req, Resp>
where
    F: Fn(Req, InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    JsonHandler {
        f,
        _types: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, Req, Resp> InvocationHandler for JsonHandler<F, Req, Resp>
where
    F: Fn(Req, InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    async fn invoke(
        &self,
        request: InvocationRequest,
        context: InvocationContext,
    ) -> Result<InvocationResponse, HandlerError> {
        let payload: Req = request.json()?;
        let output = (self.f)(payload, context).await?;
        InvocationResponse::json(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Greeting {
        name: String,
    }

    #[derive(Serialize)]
    struct Reply {
        message: String,
    }

    fn context() -> InvocationContext {
        InvocationContext::new(HeaderMap::new(), "default")
    }

    #[tokio::test]
    async fn test_handler_fn_sees_context() {
        let handler = handler_fn(|_request, context: InvocationContext| async move {
            Ok::<_, HandlerError>(InvocationResponse::text(context.client_id().to_string()))
        });
        assert!(handler.accepts_context());

        let response = handler
            .invoke(InvocationRequest::text_body("ignored"), context())
            .await
            .unwrap();
        match response {
            InvocationResponse::Text(text) => assert_eq!(text, "default"),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_payload_fn_skips_context() {
        let handler = payload_fn(|request: InvocationRequest| async move {
            Ok::<_, HandlerError>(InvocationResponse::text(
                request.text()?.to_uppercase(),
            ))
        });
        assert!(!handler.accepts_context());

        let response = handler
            .invoke(InvocationRequest::text_body("abc"), context())
            .await
            .unwrap();
        assert!(matches!(response, InvocationResponse::Text(t) if t == "ABC"));
    }

    #[tokio::test]
    async fn test_json_handler() {
        let handler = json_handler(|greeting: Greeting, _context| async move {
            Ok::<_, HandlerError>(Reply {
                message: format!("hello {}", greeting.name),
            })
        });

        let response = handler
            .invoke(
                InvocationRequest::json_body(&serde_json::json!({"name": "agent"})),
                context(),
            )
            .await
            .unwrap();
        match response {
            InvocationResponse::Json(value) => {
                assert_eq!(value, serde_json::json!({"message": "hello agent"}))
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_json_handler_conversion_failure() {
        let handler = json_handler(|greeting: Greeting, _context| async move {
            Ok::<_, HandlerError>(Reply {
                message: greeting.name,
            })
        });

        let err = handler
            .invoke(InvocationRequest::text_body("not an object"), context())
            .await
            .unwrap_err();
        assert!(err.message().starts_with("Type conversion failed"));
        assert_eq!(err.status(), None);
    }
}
