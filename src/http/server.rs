//! HTTP 服务器 - 使用 Axum 暴露 /invocations 与 /ping

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::GateConfig;
use crate::error::Result;
use crate::gate::InvocationGate;
use crate::http::routes;
use crate::throttle::{RateLimiter, ThrottleScope};

/// 空闲客户端窗口的清理周期
const PURGE_INTERVAL: Duration = Duration::from_secs(30);

/// HTTP 服务器共享状态
#[derive(Clone)]
pub struct HttpServerState {
    pub gate: Arc<InvocationGate>,
    /// /invocations 请求体上限（字节）
    pub max_body_bytes: usize,
}

/// 构建路由（不绑定端口，测试可直接 oneshot）
pub fn create_router(gate: Arc<InvocationGate>, max_body_bytes: usize, metrics_enabled: bool) -> Router {
    Router::new()
        .merge(routes::create_routes(metrics_enabled))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(HttpServerState {
            gate,
            max_body_bytes,
        })
}

/// 网关 HTTP 服务器
pub struct GateHttpServer {
    gate: Arc<InvocationGate>,
    bind_address: String,
    max_body_bytes: usize,
    metrics_enabled: bool,
}

impl GateHttpServer {
    pub fn new(gate: Arc<InvocationGate>, config: &GateConfig) -> Self {
        Self {
            gate,
            bind_address: config.bind_address(),
            max_body_bytes: config.max_body_bytes,
            metrics_enabled: config.metrics_enabled,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.gate.clone(), self.max_body_bytes, self.metrics_enabled)
    }

    /// 启动 HTTP 服务器，收到 Ctrl+C / SIGTERM 后优雅退出
    pub async fn start(self) -> Result<()> {
        let app = self.router();

        let purge_task = (self.gate.limiter().scope() == ThrottleScope::Client)
            .then(|| tokio::spawn(purge_idle_clients(self.gate.limiter().clone())));

        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        info!("🌐 AgentCore Gate 启动在 {}", self.bind_address);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        if let Some(task) = purge_task {
            task.abort();
        }
        info!("👋 AgentCore Gate 已停止");
        Ok(())
    }
}

/// 定期清理空闲的客户端限流窗口
async fn purge_idle_clients(limiter: Arc<RateLimiter>) {
    let mut ticker = tokio::time::interval(PURGE_INTERVAL);
    loop {
        ticker.tick().await;
        let purged = limiter.purge_idle();
        if purged > 0 {
            debug!(
                "🧹 清理 {} 个空闲客户端窗口，剩余 {}",
                purged,
                limiter.tracked_clients()
            );
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("无法监听 Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("无法监听 SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到 Ctrl+C，正在关闭...");
        },
        _ = terminate => {
            info!("收到 SIGTERM，正在关闭...");
        },
    }
}
