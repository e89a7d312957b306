use axum::http::HeaderMap;
use chrono::{DateTime, Utc};

use crate::identity::ConversationIdentity;

/// AgentCore 运行时常用请求头
pub mod headers {
    /// 会话 ID
    pub const SESSION_ID: &str = "X-Amzn-Bedrock-AgentCore-Runtime-Session-Id";
    /// 用户 ID
    pub const USER_ID: &str = "X-Amzn-Bedrock-AgentCore-Runtime-User-Id";
    /// 自定义请求头前缀
    pub const CUSTOM_HEADER_PREFIX: &str = "X-Amzn-Bedrock-AgentCore-Runtime-Custom-";

    pub const AUTHORIZATION: &str = "Authorization";

    pub const REQUEST_ID: &str = "X-Amzn-RequestId";

    pub const FORWARDED_FOR: &str = "X-Forwarded-For";
}

/// 单次 invocation 的请求上下文
///
/// 每个请求构造一次，显式传给 handler，不放在任何线程局部状态中。
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// 请求头（只读副本）
    headers: HeaderMap,
    /// 请求 ID（取自 X-Amzn-RequestId，缺失时生成）
    request_id: String,
    /// 限流使用的客户端标识
    client_id: String,
    /// 会话标识（handler 不需要上下文时为空）
    conversation: Option<ConversationIdentity>,
    /// 接收时间
    received_at: DateTime<Utc>,
}

impl InvocationContext {
    /// 创建新的请求上下文
    pub fn new(headers: HeaderMap, client_id: impl Into<String>) -> Self {
        let request_id = headers
            .get(headers::REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            headers,
            request_id,
            client_id: client_id.into(),
            conversation: None,
            received_at: Utc::now(),
        }
    }

    /// 设置会话标识
    pub fn with_conversation(mut self, conversation: ConversationIdentity) -> Self {
        self.conversation = Some(conversation);
        self
    }

    /// 全部请求头
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 获取单个请求头（大小写不敏感，取第一个值）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.header(headers::SESSION_ID)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.header(headers::USER_ID)
    }

    /// `X-Amzn-Bedrock-AgentCore-Runtime-Custom-*` 请求头，返回去掉前缀后的名称
    pub fn custom_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        let prefix = headers::CUSTOM_HEADER_PREFIX.to_ascii_lowercase();
        self.headers.iter().filter_map(move |(name, value)| {
            let suffix = name.as_str().strip_prefix(prefix.as_str())?;
            Some((suffix, value.to_str().ok()?))
        })
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// 会话标识
    pub fn conversation(&self) -> Option<&ConversationIdentity> {
        self.conversation.as_ref()
    }

    /// 会话标识字符串
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation.as_ref().map(|c| c.as_str())
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}
