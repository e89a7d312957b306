//! 限流使用的客户端标识

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::extract::Request;
use axum::http::HeaderMap;

use crate::context::headers::FORWARDED_FOR;
use crate::throttle::DEFAULT_CLIENT_KEY;

/// 客户端标识：X-Forwarded-For 第一个地址 → 对端地址 → `"default"`
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(forwarded), _) => forwarded.to_string(),
        (None, Some(peer)) => peer.ip().to_string(),
        (None, None) => DEFAULT_CLIENT_KEY.to_string(),
    }
}

/// 从请求中取客户端标识（未挂载 ConnectInfo 时只看请求头）
pub(crate) fn client_key_of(request: &Request) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    client_key(request.headers(), peer)
}
