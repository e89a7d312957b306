use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::throttle::{RateLimitConfig, ThrottleScope};

/// 默认配置文件
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// 环境变量前缀
const ENV_PREFIX: &str = "AGENTCORE_";

/// 网关配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// /invocations 请求体上限（字节）
    pub max_body_bytes: usize,
    /// 限流配置
    pub throttle: ThrottleConfig,
    /// /ping 配置
    pub ping: PingConfig,
    /// 会话标识配置
    pub identity: IdentityConfig,
    /// 是否启用 Prometheus 指标
    pub metrics_enabled: bool,
    /// 日志配置
    pub logging: LoggingConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_bytes: 10 * 1024 * 1024,
            throttle: ThrottleConfig::default(),
            ping: PingConfig::default(),
            identity: IdentityConfig::default(),
            metrics_enabled: false,
            logging: LoggingConfig::default(),
        }
    }
}

/// 限流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// /invocations 每窗口上限（0 = 不限流）
    pub invocations_limit: u32,
    /// /ping 每窗口上限（0 = 不限流）
    pub ping_limit: u32,
    /// 窗口长度（毫秒）
    pub window_ms: u64,
    /// 作用域：global / client
    pub scope: ThrottleScope,
    /// 客户端窗口空闲多少个窗口长度后清理
    pub idle_windows: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            invocations_limit: 0,
            ping_limit: 0,
            window_ms: 1000,
            scope: ThrottleScope::Global,
            idle_windows: 60,
        }
    }
}

impl ThrottleConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// /ping 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingConfig {
    /// 在途任务数超过该值时上报 HealthyBusy
    pub busy_threshold: u64,
}

/// 会话标识配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// 会话 ID 请求头
    pub session_header: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            session_header: crate::context::headers::SESSION_ID.to_string(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// pretty / json / compact
    pub format: Option<String>,
    /// 日志文件路径
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
            file: None,
        }
    }
}

impl GateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 TOML 文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("无法读取配置文件: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 文本加载配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content).with_context(|| "配置文件格式错误")?;
        toml_config.try_into()
    }

    /// 从环境变量合并（AGENTCORE_ 前缀）
    pub fn merge_from_env(&mut self) -> Result<()> {
        self.merge_from_vars(|key| env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    /// `lookup` 以去掉前缀的变量名查询
    fn merge_from_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = parse_var("PORT", &port)?;
        }
        if let Some(limit) = lookup("THROTTLE_INVOCATIONS_LIMIT") {
            self.throttle.invocations_limit = parse_var("THROTTLE_INVOCATIONS_LIMIT", &limit)?;
        }
        if let Some(limit) = lookup("THROTTLE_PING_LIMIT") {
            self.throttle.ping_limit = parse_var("THROTTLE_PING_LIMIT", &limit)?;
        }
        if let Some(window) = lookup("THROTTLE_WINDOW_MS") {
            self.throttle.window_ms = parse_var("THROTTLE_WINDOW_MS", &window)?;
        }
        if let Some(scope) = lookup("THROTTLE_SCOPE") {
            self.throttle.scope = ThrottleScope::from_str(&scope).map_err(anyhow::Error::msg)?;
        }
        if let Some(threshold) = lookup("PING_BUSY_THRESHOLD") {
            self.ping.busy_threshold = parse_var("PING_BUSY_THRESHOLD", &threshold)?;
        }
        if let Some(header) = lookup("SESSION_HEADER") {
            self.identity.session_header = header;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(enabled) = lookup("METRICS_ENABLED") {
            self.metrics_enabled = parse_bool(&enabled);
        }
        Ok(())
    }

    /// 从命令行参数合并配置
    pub fn merge_from_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(limit) = cli.invocations_limit {
            self.throttle.invocations_limit = limit;
        }
        if let Some(limit) = cli.ping_limit {
            self.throttle.ping_limit = limit;
        }
        if let Some(window) = cli.rate_window_ms {
            self.throttle.window_ms = window;
        }
        if cli.enable_metrics {
            self.metrics_enabled = true;
        }
        if let Some(level) = cli.get_log_level() {
            self.logging.level = level;
        }
        if let Some(format) = cli.get_log_format() {
            self.logging.format = Some(format);
        }
        if let Some(file) = &cli.log_file {
            self.logging.file = Some(file.clone());
        }
    }

    /// 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    pub fn load(cli: &crate::cli::Cli) -> Result<Self> {
        // 1. 配置文件（未指定时尝试 config.toml）
        let mut config = match &cli.config_file {
            Some(config_file) if Path::new(config_file).exists() => {
                info!("📄 从配置文件加载: {}", config_file);
                Self::from_toml_file(config_file)?
            }
            Some(config_file) => {
                warn!("⚠️ 配置文件不存在: {}", config_file);
                Self::new()
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                info!("📄 从默认配置文件加载: {}", DEFAULT_CONFIG_FILE);
                Self::from_toml_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::new(),
        };

        // 2. 环境变量
        config.merge_from_env()?;

        // 3. 命令行参数
        config.merge_from_cli(cli);

        config.validate()?;
        Ok(config)
    }

    /// 启动前校验
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("port 不能为 0");
        }
        if self.throttle.window_ms == 0 {
            bail!("throttle.window_ms 不能为 0");
        }
        if self.max_body_bytes == 0 {
            bail!("server.max_body_bytes 不能为 0");
        }
        self.session_header()?;
        Ok(())
    }

    /// 监听地址
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 会话 ID 请求头（大小写不敏感，统一为小写）
    pub fn session_header(&self) -> Result<HeaderName> {
        HeaderName::from_bytes(self.identity.session_header.trim().to_ascii_lowercase().as_bytes())
            .with_context(|| format!("非法的会话请求头: {:?}", self.identity.session_header))
    }

    pub fn to_rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            invocations_limit: self.throttle.invocations_limit,
            ping_limit: self.throttle.ping_limit,
            window: self.throttle.window(),
            scope: self.throttle.scope,
            idle_windows: self.throttle.idle_windows,
        }
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("环境变量 {}{} 无效 ({:?}): {}", ENV_PREFIX, key, value, e))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// 日志配置（在完整配置加载之前读取）
#[derive(Debug, Default)]
pub struct EarlyLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
    pub file: Option<String>,
}

impl EarlyLoggingConfig {
    /// 环境变量覆盖配置文件中的日志级别
    fn merge_from_vars<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("LOG_LEVEL").filter(|level| !level.trim().is_empty()) {
            self.level = Some(level.trim().to_string());
        }
        self
    }

    /// 最终日志级别（优先级：CLI > 环境变量 > 配置文件 > info）
    pub fn resolve_level(&self, cli_level: Option<String>) -> String {
        cli_level
            .or_else(|| self.level.clone())
            .unwrap_or_else(|| "info".to_string())
    }
}

/// 快速读取日志配置：配置文件的 [logging] 段，再叠加 AGENTCORE_LOG_LEVEL
pub fn load_early_logging_config(config_file: Option<&str>) -> EarlyLoggingConfig {
    read_early_logging_file(config_file)
        .merge_from_vars(|key| env::var(format!("{}{}", ENV_PREFIX, key)).ok())
}

/// 读取配置文件的 [logging] 段；读取失败时返回空配置
fn read_early_logging_file(config_file: Option<&str>) -> EarlyLoggingConfig {
    let path = config_file.unwrap_or(DEFAULT_CONFIG_FILE);
    let Ok(content) = fs::read_to_string(path) else {
        return EarlyLoggingConfig::default();
    };

    #[derive(Deserialize)]
    struct LoggingOnly {
        logging: Option<TomlLoggingConfig>,
    }

    match toml::from_str::<LoggingOnly>(&content) {
        Ok(LoggingOnly {
            logging: Some(logging),
        }) => EarlyLoggingConfig {
            level: logging.level,
            format: logging.format,
            file: logging.file,
        },
        _ => EarlyLoggingConfig::default(),
    }
}

/// TOML 配置文件结构（用于反序列化）
#[derive(Debug, Deserialize)]
struct TomlConfig {
    server: Option<TomlServerConfig>,
    throttle: Option<TomlThrottleConfig>,
    ping: Option<TomlPingConfig>,
    identity: Option<TomlIdentityConfig>,
    metrics: Option<TomlMetricsConfig>,
    logging: Option<TomlLoggingConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlServerConfig {
    host: Option<String>,
    port: Option<u16>,
    max_body_bytes: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct TomlThrottleConfig {
    invocations_limit: Option<u32>,
    ping_limit: Option<u32>,
    window_ms: Option<u64>,
    scope: Option<String>,
    idle_windows: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TomlPingConfig {
    busy_threshold: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TomlIdentityConfig {
    session_header: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlMetricsConfig {
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TomlLoggingConfig {
    level: Option<String>,
    format: Option<String>,
    file: Option<String>,
}

impl TryFrom<TomlConfig> for GateConfig {
    type Error = anyhow::Error;

    fn try_from(toml: TomlConfig) -> Result<Self> {
        let mut config = Self::default();

        if let Some(server) = toml.server {
            if let Some(host) = server.host {
                config.host = host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
            if let Some(max_body_bytes) = server.max_body_bytes {
                config.max_body_bytes = max_body_bytes;
            }
        }

        if let Some(throttle) = toml.throttle {
            if let Some(limit) = throttle.invocations_limit {
                config.throttle.invocations_limit = limit;
            }
            if let Some(limit) = throttle.ping_limit {
                config.throttle.ping_limit = limit;
            }
            if let Some(window) = throttle.window_ms {
                config.throttle.window_ms = window;
            }
            if let Some(scope) = throttle.scope {
                config.throttle.scope = ThrottleScope::from_str(&scope).map_err(anyhow::Error::msg)?;
            }
            if let Some(idle_windows) = throttle.idle_windows {
                config.throttle.idle_windows = idle_windows;
            }
        }

        if let Some(busy_threshold) = toml.ping.and_then(|p| p.busy_threshold) {
            config.ping.busy_threshold = busy_threshold;
        }

        if let Some(header) = toml.identity.and_then(|i| i.session_header) {
            config.identity.session_header = header;
        }

        if let Some(enabled) = toml.metrics.and_then(|m| m.enabled) {
            config.metrics_enabled = enabled;
        }

        if let Some(logging) = toml.logging {
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            config.logging.format = logging.format;
            config.logging.file = logging.file;
        }

        Ok(config)
    }
}
