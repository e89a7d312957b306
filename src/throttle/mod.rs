/// 限流模块
///
/// /invocations 与 /ping 分别配置上限，各自独立计数：
/// - `limit = 0` 关闭该端点的限流
/// - `ThrottleScope::Global`：整个进程一个窗口
/// - `ThrottleScope::Client`：按客户端地址分别计数
pub mod rate_limiter;

pub use rate_limiter::{
    EndpointCategory, RateLimitConfig, RateLimiter, RateWindow, ThrottleScope, DEFAULT_CLIENT_KEY,
    DEFAULT_WINDOW,
};
