//! Prometheus 指标：invocation 次数与耗时、限流拒绝、在途任务、/ping 状态
//!
//! 通过 `init()` 安装全局 Recorder，通过 HTTP GET `/metrics` 暴露抓取端点。
//! 未初始化时各 `record_*` 调用为空操作。

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::OnceLock;

use crate::ping::PingStatus;
use crate::throttle::EndpointCategory;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 指标名称
const COUNTER_INVOCATIONS_TOTAL: &str = "agentcore_invocations_total";
const HISTOGRAM_INVOCATION_DURATION: &str = "agentcore_invocation_duration_seconds";
const COUNTER_THROTTLED_TOTAL: &str = "agentcore_throttled_total";
const GAUGE_TASKS_INFLIGHT: &str = "agentcore_tasks_inflight";
const GAUGE_PING_STATUS: &str = "agentcore_ping_status";

/// 初始化 Prometheus 指标（安装全局 Recorder，返回 Handle 用于 HTTP 暴露）。
/// 仅需在进程内调用一次；重复调用会返回 Err。
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    HANDLE
        .set(handle)
        .map_err(|_| "metrics already initialized")?;
    Ok(())
}

/// 渲染当前指标为 Prometheus 文本格式，供 GET /metrics 使用。
pub fn render_metrics() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// 记录一次 invocation：按结果计数 + 耗时直方图。
///
/// `outcome` 取值：`ok` / `error` / `panic`
pub fn record_invocation(outcome: &'static str, duration_secs: f64) {
    metrics::counter!(COUNTER_INVOCATIONS_TOTAL, "outcome" => outcome).increment(1);
    metrics::histogram!(HISTOGRAM_INVOCATION_DURATION, "outcome" => outcome).record(duration_secs);
}

/// 记录一次限流拒绝。
pub fn record_throttled(category: EndpointCategory) {
    metrics::counter!(COUNTER_THROTTLED_TOTAL, "endpoint" => category.as_str()).increment(1);
}

/// 在途任务数 +1（Gauge）。
pub fn record_task_started() {
    metrics::gauge!(GAUGE_TASKS_INFLIGHT).increment(1.0);
}

/// 在途任务数 -1（Gauge）。
pub fn record_task_finished() {
    metrics::gauge!(GAUGE_TASKS_INFLIGHT).decrement(1.0);
}

/// 更新 /ping 状态（Gauge：0 Healthy，1 HealthyBusy，2 Unhealthy）。
pub fn record_ping_status(status: PingStatus) {
    metrics::gauge!(GAUGE_PING_STATUS).set(status.as_gauge());
}
