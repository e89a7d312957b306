/// 端点限流器
///
/// 核心特性：
/// 1. 按端点类别（invocations / ping）独立限流，两个类别互不共享锁
/// 2. 固定窗口计数：窗口到期后在下一次请求时重新开窗
/// 3. limit = 0 表示关闭该类别的限流
/// 4. 可选按客户端（X-Forwarded-For / 对端 IP）分别计数
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// 默认窗口长度
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// 客户端标识缺失时使用的 key
pub const DEFAULT_CLIENT_KEY: &str = "default";

/// 端点类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointCategory {
    /// POST /invocations
    Invocations,
    /// GET /ping
    Ping,
}

impl EndpointCategory {
    pub const INVOCATIONS_PATH: &'static str = "/invocations";
    pub const PING_PATH: &'static str = "/ping";

    /// 对应的 HTTP 路径
    pub fn path(&self) -> &'static str {
        match self {
            EndpointCategory::Invocations => Self::INVOCATIONS_PATH,
            EndpointCategory::Ping => Self::PING_PATH,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointCategory::Invocations => "invocations",
            EndpointCategory::Ping => "ping",
        }
    }
}

impl fmt::Display for EndpointCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 限流作用域
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleScope {
    /// 每个类别一个全局窗口
    #[default]
    Global,
    /// 每个类别、每个客户端一个窗口
    Client,
}

impl FromStr for ThrottleScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(ThrottleScope::Global),
            "client" | "per_client" | "per-client" => Ok(ThrottleScope::Client),
            other => Err(format!("未知的限流作用域: {}", other)),
        }
    }
}

/// 限流配置
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// /invocations 每窗口请求上限（0 = 不限流）
    pub invocations_limit: u32,
    /// /ping 每窗口请求上限（0 = 不限流）
    pub ping_limit: u32,
    /// 窗口长度
    pub window: Duration,
    /// 作用域
    pub scope: ThrottleScope,
    /// 客户端窗口空闲多少个窗口长度后被清理
    pub idle_windows: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            invocations_limit: 0,
            ping_limit: 0,
            window: DEFAULT_WINDOW,
            scope: ThrottleScope::Global,
            idle_windows: 60,
        }
    }
}

/// 固定窗口计数器
///
/// 不变量：`limit > 0` 时始终满足 `count <= limit`。
#[derive(Debug)]
pub struct RateWindow {
    limit: u32,
    /// 首个请求到达前为空
    window_start: Option<Instant>,
    count: u32,
}

impl RateWindow {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            window_start: None,
            count: 0,
        }
    }

    /// 尝试占用一个配额
    fn try_acquire(&mut self, now: Instant, window: Duration) -> bool {
        if self.limit == 0 {
            return true;
        }

        // 尚未开窗或窗口已过期：从当前时刻重新开窗
        let expired = match self.window_start {
            Some(start) => now.saturating_duration_since(start) >= window,
            None => true,
        };
        if expired {
            self.window_start = Some(now);
            self.count = 0;
        }

        if self.count < self.limit {
            self.count += 1;
            true
        } else {
            false
        }
    }

    fn is_idle(&self, now: Instant, idle_for: Duration) -> bool {
        self.window_start
            .map_or(true, |start| now.saturating_duration_since(start) >= idle_for)
    }

    /// 当前窗口内已计数的请求
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

/// 单个类别的限流状态
struct CategoryLimiter {
    limit: u32,
    global: Mutex<RateWindow>,
    per_client: DashMap<String, RateWindow>,
}

impl CategoryLimiter {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            global: Mutex::new(RateWindow::new(limit)),
            per_client: DashMap::new(),
        }
    }
}

/// 端点限流器
pub struct RateLimiter {
    window: Duration,
    scope: ThrottleScope,
    idle_windows: u32,
    invocations: CategoryLimiter,
    ping: CategoryLimiter,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            window: config.window,
            scope: config.scope,
            idle_windows: config.idle_windows.max(1),
            invocations: CategoryLimiter::new(config.invocations_limit),
            ping: CategoryLimiter::new(config.ping_limit),
        }
    }

    /// 不限流的实例
    pub fn disabled() -> Self {
        Self::new(RateLimitConfig::default())
    }

    fn category(&self, category: EndpointCategory) -> &CategoryLimiter {
        match category {
            EndpointCategory::Invocations => &self.invocations,
            EndpointCategory::Ping => &self.ping,
        }
    }

    /// 类别的配置上限
    pub fn limit(&self, category: EndpointCategory) -> u32 {
        self.category(category).limit
    }

    pub fn scope(&self) -> ThrottleScope {
        self.scope
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// 检查并消耗全局配额
    pub fn allow(&self, category: EndpointCategory) -> bool {
        self.allow_for(category, DEFAULT_CLIENT_KEY)
    }

    /// 检查并消耗配额；`Global` 作用域下忽略客户端 key
    pub fn allow_for(&self, category: EndpointCategory, client_key: &str) -> bool {
        self.allow_at(category, client_key, Instant::now())
    }

    pub(crate) fn allow_at(&self, category: EndpointCategory, client_key: &str, now: Instant) -> bool {
        let limiter = self.category(category);
        if limiter.limit == 0 {
            return true;
        }

        match self.scope {
            ThrottleScope::Global => limiter.global.lock().try_acquire(now, self.window),
            ThrottleScope::Client => {
                // entry 持有分片写锁，读-改-写在同一临界区内完成
                let mut window = limiter
                    .per_client
                    .entry(client_key.to_string())
                    .or_insert_with(|| RateWindow::new(limiter.limit));
                window.try_acquire(now, self.window)
            }
        }
    }

    /// 清理长时间空闲的客户端窗口，返回清理数量
    pub fn purge_idle(&self) -> usize {
        self.purge_idle_at(Instant::now())
    }

    pub(crate) fn purge_idle_at(&self, now: Instant) -> usize {
        let idle_for = self.window.saturating_mul(self.idle_windows);
        let mut purged = 0;
        for limiter in [&self.invocations, &self.ping] {
            let before = limiter.per_client.len();
            limiter
                .per_client
                .retain(|_, window| !window.is_idle(now, idle_for));
            purged += before.saturating_sub(limiter.per_client.len());
        }
        purged
    }

    /// 当前跟踪的客户端窗口数量
    pub fn tracked_clients(&self) -> usize {
        self.invocations.per_client.len() + self.ping.per_client.len()
    }
}
