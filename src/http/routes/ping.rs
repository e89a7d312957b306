//! 健康状态路由
//!
//! 路由：GET /ping

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};

use crate::error::Result;
use crate::http::client::client_key_of;
use crate::http::HttpServerState;
use crate::ping::PingBody;
use crate::throttle::EndpointCategory;

/// 创建 ping 路由
pub fn create_route() -> Router<HttpServerState> {
    Router::new().route(EndpointCategory::PING_PATH, get(ping))
}

/// Healthy / HealthyBusy → 200，Unhealthy → 503
async fn ping(
    State(state): State<HttpServerState>,
    request: Request,
) -> Result<(StatusCode, Json<PingBody>)> {
    let client_id = client_key_of(&request);
    let response = state.gate.ping(&client_id).await?;
    Ok((response.http_status, Json(response.body())))
}
