// Infrastructure layer - 基础设施层
// 负责进程级基础服务：Prometheus 指标

pub mod metrics;
