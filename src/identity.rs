//! 会话标识解析
//!
//! 优先级：
//! 1. Bearer token 中的 `sub` 与会话请求头同时存在 → `"<sub>:<session>"`
//! 2. 只有会话请求头 → `"<session>"`
//! 3. 其它情况 → 新生成的 UUID
//!
//! token 只做结构解析，不校验签名；格式不合法视为不存在，不会报错。

use std::fmt;

use axum::http::{header, HeaderMap, HeaderName};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde_json::Value;
use tracing::debug;

use crate::context::headers;

/// base64url 解码，兼容带或不带 padding
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const BEARER_PREFIX: &str = "Bearer ";

/// 会话标识来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentitySource {
    /// token subject + 会话请求头
    Authenticated,
    /// 仅会话请求头
    Session,
    /// 新生成
    Generated,
}

/// 会话标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationIdentity {
    value: String,
    source: IdentitySource,
}

impl ConversationIdentity {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> IdentitySource {
        self.source
    }

    pub fn into_string(self) -> String {
        self.value
    }
}

impl fmt::Display for ConversationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// 请求头 → 会话标识
#[derive(Debug, Clone)]
pub struct HeaderIdentityResolver {
    session_header: HeaderName,
}

impl Default for HeaderIdentityResolver {
    fn default() -> Self {
        Self {
            session_header: HeaderName::from_static("x-amzn-bedrock-agentcore-runtime-session-id"),
        }
    }
}

impl HeaderIdentityResolver {
    pub fn new(session_header: HeaderName) -> Self {
        Self { session_header }
    }

    /// 当前使用的会话请求头
    pub fn session_header(&self) -> &HeaderName {
        &self.session_header
    }

    /// 解析会话标识（纯函数，不修改输入）
    pub fn resolve(&self, headers: &HeaderMap) -> ConversationIdentity {
        let subject = bearer_subject(headers);
        let session = headers
            .get(&self.session_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match (subject, session) {
            (Some(subject), Some(session)) => ConversationIdentity {
                value: format!("{}:{}", subject, session),
                source: IdentitySource::Authenticated,
            },
            (_, Some(session)) => ConversationIdentity {
                value: session.to_string(),
                source: IdentitySource::Session,
            },
            _ => ConversationIdentity {
                value: uuid::Uuid::new_v4().to_string(),
                source: IdentitySource::Generated,
            },
        }
    }
}

/// 从 Authorization 头中取出 token 的 `sub`
fn bearer_subject(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?.trim();

    match token_subject(token) {
        Ok(subject) => Some(subject),
        Err(reason) => {
            debug!("忽略无法解析的 {} token: {}", headers::AUTHORIZATION, reason);
            None
        }
    }
}

fn token_subject(token: &str) -> Result<String, &'static str> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err("token 不是三段式");
    }

    let payload = BASE64_URL
        .decode(segments[1])
        .map_err(|_| "payload 不是合法的 base64url")?;
    let claims: Value = serde_json::from_slice(&payload).map_err(|_| "payload 不是 JSON")?;

    let subject = match claims.get("sub") {
        Some(Value::String(sub)) => sub.trim().to_string(),
        Some(Value::Number(sub)) => sub.to_string(),
        _ => return Err("缺少 sub"),
    };

    if subject.is_empty() {
        return Err("sub 为空");
    }
    Ok(subject)
}
