use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handler::HandlerError;
use crate::throttle::EndpointCategory;

/// 限流拒绝时返回的固定响应体
pub const RATE_LIMIT_BODY: &str = r#"{"error":"Rate limit exceeded"}"#;

/// 网关错误类型
#[derive(Debug, Error)]
pub enum GateError {
    /// 配置错误（启动期致命，不会出现在请求路径上）
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// 限流拒绝
    #[error("Rate limit exceeded on {0}")]
    RateLimited(EndpointCategory),
    /// 注册的 handler 执行失败
    #[error("Invocation failed: {0}")]
    Handler(#[from] HandlerError),
    /// 请求体无法读取
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// 对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GateError::Handler(e) => e.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            GateError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GateError::Configuration(_)
            | GateError::Serialization(_)
            | GateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        if let GateError::RateLimited(_) = self {
            return (
                status_code,
                [(axum::http::header::CONTENT_TYPE, "application/json")],
                RATE_LIMIT_BODY,
            )
                .into_response();
        }

        let error_response = ErrorResponse::new(&self);
        (status_code, Json(error_response)).into_response()
    }
}

impl From<serde_json::Error> for GateError {
    fn from(err: serde_json::Error) -> Self {
        GateError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for GateError {
    fn from(err: std::io::Error) -> Self {
        GateError::Internal(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, GateError>;

/// 错误代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// 内部错误
    Internal = 1000,
    /// 配置错误
    Configuration = 2003,
    /// 序列化错误
    Serialization = 2002,
    /// 限流错误
    RateLimit = 3000,
    /// Handler 执行失败
    Invocation = 3003,
    /// 错误请求
    BadRequest = 5004,
}

impl From<&GateError> for ErrorCode {
    fn from(error: &GateError) -> Self {
        match error {
            GateError::Configuration(_) => ErrorCode::Configuration,
            GateError::RateLimited(_) => ErrorCode::RateLimit,
            GateError::Handler(_) => ErrorCode::Invocation,
            GateError::BadRequest(_) => ErrorCode::BadRequest,
            GateError::Serialization(_) => ErrorCode::Serialization,
            GateError::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// 错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: ErrorCode,
    /// 错误消息
    pub message: String,
    /// 时间戳
    pub timestamp: u64,
}

impl ErrorResponse {
    /// 创建错误响应
    pub fn new(error: &GateError) -> Self {
        Self {
            code: ErrorCode::from(error),
            message: error.to_string(),
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }
}
