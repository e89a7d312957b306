//! /ping 状态计算
//!
//! 状态机：
//! - Healthy：在途任务数 <= busy 阈值
//! - HealthyBusy：在途任务数 > busy 阈值
//! - Unhealthy：接入的健康检查报告非 Up 或检查本身失败
//!
//! 未接入健康检查时永远不会进入 Unhealthy。
//! `time_of_last_update` 只在状态变化时刷新。

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::status::{PingResponse, PingStatus};
use super::task_tracker::TaskTracker;

/// 上游健康状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthState {
    Up,
    Down(String),
}

/// 外部健康检查
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> anyhow::Result<HealthState>;
}

/// /ping 状态来源，应用可替换默认实现
#[async_trait]
pub trait PingService: Send + Sync {
    async fn ping_status(&self) -> PingResponse;
}

/// 默认的 /ping 状态计算器
pub struct PingStatusResolver {
    tracker: Arc<TaskTracker>,
    health_check: Option<Arc<dyn HealthCheck>>,
    busy_threshold: u64,
    last: Mutex<Option<PingResponse>>,
}

impl PingStatusResolver {
    pub fn new(tracker: Arc<TaskTracker>) -> Self {
        Self {
            tracker,
            health_check: None,
            busy_threshold: 0,
            last: Mutex::new(None),
        }
    }

    /// 在途任务数超过该值时上报 HealthyBusy
    pub fn with_busy_threshold(mut self, busy_threshold: u64) -> Self {
        self.busy_threshold = busy_threshold;
        self
    }

    pub fn with_health_check(mut self, health_check: Arc<dyn HealthCheck>) -> Self {
        self.health_check = Some(health_check);
        self
    }

    /// 计算当前状态
    pub async fn resolve(&self) -> PingResponse {
        let status = self.compute().await;
        self.remember(status, chrono::Utc::now().timestamp())
    }

    async fn compute(&self) -> PingStatus {
        if let Some(health_check) = &self.health_check {
            match health_check.check().await {
                Ok(HealthState::Up) => {}
                Ok(HealthState::Down(reason)) => {
                    debug!("健康检查报告 Down: {}", reason);
                    return PingStatus::Unhealthy;
                }
                Err(e) => {
                    warn!("健康检查不可用: {}", e);
                    return PingStatus::Unhealthy;
                }
            }
        }

        if self.tracker.current() > self.busy_threshold {
            PingStatus::HealthyBusy
        } else {
            PingStatus::Healthy
        }
    }

    /// 状态未变时沿用上一次的时间戳
    fn remember(&self, status: PingStatus, now: i64) -> PingResponse {
        let mut last = self.last.lock();
        if let Some(previous) = last.as_ref() {
            if previous.status == status {
                return previous.clone();
            }
        }

        let changed_at = last
            .as_ref()
            .map_or(now, |previous| now.max(previous.time_of_last_update));
        let response = PingResponse::new(status, changed_at);
        *last = Some(response.clone());
        response
    }
}

#[async_trait]
impl PingService for PingStatusResolver {
    async fn ping_status(&self) -> PingResponse {
        self.resolve().await
    }
}
