//! HTTP 路由模块
//!
//! 路由结构：
//! - `/invocations` - 调用已注册的 handler
//! - `/ping`        - 健康状态
//! - `/metrics`     - Prometheus 指标（启用时挂载）

pub mod invocations;
pub mod metrics;
pub mod ping;

use axum::{routing::get, Router};

use crate::http::HttpServerState;

/// 创建所有路由
pub fn create_routes(metrics_enabled: bool) -> Router<HttpServerState> {
    let router = Router::new()
        .merge(invocations::create_route()) // POST /invocations
        .merge(ping::create_route()); // GET /ping

    if metrics_enabled {
        router.route("/metrics", get(metrics::metrics_handler))
    } else {
        router
    }
}
