use std::fmt;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// 运行时健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PingStatus {
    /// 空闲，可接收新任务
    #[serde(rename = "Healthy")]
    Healthy,
    /// 有在途任务，但上游正常
    #[serde(rename = "HealthyBusy")]
    HealthyBusy,
    /// 健康检查失败
    #[serde(rename = "Unhealthy")]
    Unhealthy,
}

impl PingStatus {
    /// 出站 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            PingStatus::Healthy | PingStatus::HealthyBusy => StatusCode::OK,
            PingStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PingStatus::Healthy => "Healthy",
            PingStatus::HealthyBusy => "HealthyBusy",
            PingStatus::Unhealthy => "Unhealthy",
        }
    }

    /// 指标上报使用的数值
    pub fn as_gauge(&self) -> f64 {
        match self {
            PingStatus::Healthy => 0.0,
            PingStatus::HealthyBusy => 1.0,
            PingStatus::Unhealthy => 2.0,
        }
    }
}

impl fmt::Display for PingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// /ping 结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingResponse {
    pub status: PingStatus,
    pub http_status: StatusCode,
    /// 状态最近一次变化的时间（Unix 秒）
    pub time_of_last_update: i64,
}

impl PingResponse {
    pub fn new(status: PingStatus, time_of_last_update: i64) -> Self {
        Self {
            status,
            http_status: status.status_code(),
            time_of_last_update,
        }
    }

    /// 响应体
    pub fn body(&self) -> PingBody {
        PingBody {
            status: self.status,
            time_of_last_update: self.time_of_last_update,
        }
    }
}

/// /ping 响应体：`{"status": "...", "time_of_last_update": 1700000000}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingBody {
    pub status: PingStatus,
    pub time_of_last_update: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(PingStatus::Healthy.status_code(), StatusCode::OK);
        assert_eq!(PingStatus::HealthyBusy.status_code(), StatusCode::OK);
        assert_eq!(PingStatus::Unhealthy.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_body_wire_format() {
        let body = PingResponse::new(PingStatus::HealthyBusy, 1_700_000_000).body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "HealthyBusy", "time_of_last_update": 1_700_000_000})
        );
    }
}
