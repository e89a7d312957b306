//! Invocation 网关
//!
//! 处理流程：
//! - /invocations：限流 → 登记在途任务 → 解析会话标识 → 调用 handler → 释放任务
//! - /ping：限流 → 计算健康状态
//!
//! 在途任务句柄在每条退出路径上释放（成功、失败、panic、请求被取消）；
//! 流式响应的句柄跟随响应流，流结束或被丢弃时释放。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Instant;

use axum::http::{HeaderMap, HeaderName};
use futures::stream::{BoxStream, Stream};
use futures::{FutureExt, StreamExt};
use serde_json::Value;
use tracing::{debug, error, info_span, Instrument};

use crate::config::GateConfig;
use crate::context::InvocationContext;
use crate::error::{GateError, Result};
use crate::handler::{
    HandlerError, HandlerRegistry, InvocationHandler, InvocationRequest, InvocationResponse,
};
use crate::identity::HeaderIdentityResolver;
use crate::infra::metrics;
use crate::ping::{
    HealthCheck, PingResponse, PingService, PingStatusResolver, TaskHandle, TaskTracker,
};
use crate::throttle::{EndpointCategory, RateLimitConfig, RateLimiter};

/// 网关
pub struct InvocationGate {
    limiter: Arc<RateLimiter>,
    tracker: Arc<TaskTracker>,
    ping: Arc<dyn PingService>,
    handler: Arc<dyn InvocationHandler>,
    identity: HeaderIdentityResolver,
}

impl InvocationGate {
    pub fn builder() -> InvocationGateBuilder {
        InvocationGateBuilder::default()
    }

    /// 限流检查：消耗一次配额，超出时返回 `RateLimited`
    ///
    /// HTTP 层在读取请求体之前调用，被拒绝的请求不会读取请求体。
    pub fn admit(&self, category: EndpointCategory, client_id: &str) -> Result<()> {
        if self.limiter.allow_for(category, client_id) {
            return Ok(());
        }
        debug!(client = client_id, "{} 被限流", category.path());
        metrics::record_throttled(category);
        Err(GateError::RateLimited(category))
    }

    /// 处理一次 invocation（限流 + 调用）
    pub async fn invoke(
        &self,
        client_id: &str,
        headers: HeaderMap,
        request: InvocationRequest,
    ) -> Result<InvocationResponse> {
        self.admit(EndpointCategory::Invocations, client_id)?;
        self.dispatch(client_id, headers, request).await
    }

    /// 调用 handler（调用方已通过 `admit` 完成限流检查）
    pub async fn dispatch(
        &self,
        client_id: &str,
        headers: HeaderMap,
        request: InvocationRequest,
    ) -> Result<InvocationResponse> {
        let task = self.tracker.start();

        let mut context = InvocationContext::new(headers, client_id);
        if self.handler.accepts_context() {
            let conversation = self.identity.resolve(context.headers());
            context = context.with_conversation(conversation);
        }

        let span = info_span!(
            "invocation",
            request_id = %context.request_id(),
            client = %client_id,
        );
        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.handler.invoke(request, context))
            .catch_unwind()
            .instrument(span.clone())
            .await;
        let elapsed = started.elapsed().as_secs_f64();

        span.in_scope(|| match outcome {
            Ok(Ok(InvocationResponse::Stream(stream))) => {
                metrics::record_invocation("ok", elapsed);
                debug!("返回流式响应");
                Ok(InvocationResponse::Stream(
                    TrackedStream {
                        inner: stream,
                        task: Some(task),
                    }
                    .boxed(),
                ))
            }
            Ok(Ok(response)) => {
                task.end();
                metrics::record_invocation("ok", elapsed);
                debug!(kind = response.kind(), "invocation 完成");
                Ok(response)
            }
            Ok(Err(e)) => {
                task.end();
                metrics::record_invocation("error", elapsed);
                error!("❌ handler 执行失败: {}", e);
                Err(GateError::Handler(e))
            }
            Err(panic) => {
                task.end();
                metrics::record_invocation("panic", elapsed);
                let message = panic_message(panic.as_ref());
                error!("❌ handler panic: {}", message);
                Err(GateError::Handler(HandlerError::new(format!(
                    "Handler panicked: {}",
                    message
                ))))
            }
        })
    }

    /// 处理一次 /ping
    pub async fn ping(&self, client_id: &str) -> Result<PingResponse> {
        self.admit(EndpointCategory::Ping, client_id)?;

        let response = self.ping.ping_status().await;
        metrics::record_ping_status(response.status);
        Ok(response)
    }

    pub fn task_tracker(&self) -> &Arc<TaskTracker> {
        &self.tracker
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn identity_resolver(&self) -> &HeaderIdentityResolver {
        &self.identity
    }
}

/// 持有任务句柄的响应流：流结束或被丢弃时释放
struct TrackedStream {
    inner: BoxStream<'static, std::result::Result<Value, HandlerError>>,
    task: Option<TaskHandle>,
}

impl Stream for TrackedStream {
    type Item = std::result::Result<Value, HandlerError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let item = ready!(self.inner.poll_next_unpin(cx));
        if item.is_none() {
            if let Some(task) = self.task.take() {
                task.end();
            }
        }
        Poll::Ready(item)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 网关构建器
///
/// 必须且只能注册一个 handler，否则 `build()` / `handler()` 返回配置错误。
#[derive(Default)]
pub struct InvocationGateBuilder {
    rate_limit: RateLimitConfig,
    busy_threshold: u64,
    session_header: Option<HeaderName>,
    registry: HandlerRegistry,
    health_check: Option<Arc<dyn HealthCheck>>,
    ping_service: Option<Arc<dyn PingService>>,
    tracker: Option<Arc<TaskTracker>>,
}

impl InvocationGateBuilder {
    /// 应用配置中的限流、busy 阈值与会话请求头
    pub fn config(mut self, config: &GateConfig) -> Result<Self> {
        self.rate_limit = config.to_rate_limit_config();
        self.busy_threshold = config.ping.busy_threshold;
        self.session_header = Some(
            config
                .session_header()
                .map_err(|e| GateError::Configuration(format!("{:#}", e)))?,
        );
        Ok(self)
    }

    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn busy_threshold(mut self, busy_threshold: u64) -> Self {
        self.busy_threshold = busy_threshold;
        self
    }

    pub fn session_header(mut self, session_header: HeaderName) -> Self {
        self.session_header = Some(session_header);
        self
    }

    /// 注册 handler
    pub fn handler<H: InvocationHandler>(self, handler: H) -> Result<Self> {
        self.handler_arc(Arc::new(handler))
    }

    pub fn handler_arc(self, handler: Arc<dyn InvocationHandler>) -> Result<Self> {
        self.registry.register(handler)?;
        Ok(self)
    }

    /// 接入外部健康检查（使用默认 /ping 计算器时生效）
    pub fn health_check(mut self, health_check: Arc<dyn HealthCheck>) -> Self {
        self.health_check = Some(health_check);
        self
    }

    /// 替换默认的 /ping 计算器
    pub fn ping_service(mut self, ping_service: Arc<dyn PingService>) -> Self {
        self.ping_service = Some(ping_service);
        self
    }

    /// 共享外部的在途任务计数器
    pub fn task_tracker(mut self, tracker: Arc<TaskTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn build(self) -> Result<InvocationGate> {
        let handler = self.registry.handler()?;
        let tracker = self.tracker.unwrap_or_default();

        let ping = match self.ping_service {
            Some(ping) => ping,
            None => {
                let mut resolver = PingStatusResolver::new(tracker.clone())
                    .with_busy_threshold(self.busy_threshold);
                if let Some(health_check) = self.health_check {
                    resolver = resolver.with_health_check(health_check);
                }
                Arc::new(resolver) as Arc<dyn PingService>
            }
        };

        let identity = self
            .session_header
            .map(HeaderIdentityResolver::new)
            .unwrap_or_default();

        Ok(InvocationGate {
            limiter: Arc::new(RateLimiter::new(self.rate_limit)),
            tracker,
            ping,
            handler,
            identity,
        })
    }
}
