//! /ping 健康上报
//!
//! - `TaskTracker`：在途 invocation 计数
//! - `PingStatusResolver`：根据在途任务与可选的健康检查计算 Healthy / HealthyBusy / Unhealthy

pub mod resolver;
pub mod status;
pub mod task_tracker;

pub use resolver::{HealthCheck, HealthState, PingService, PingStatusResolver};
pub use status::{PingBody, PingResponse, PingStatus};
pub use task_tracker::{TaskHandle, TaskTracker};
