use clap::{Parser, Subcommand};

// 确保 Parser trait 被使用
impl Cli {
    /// 解析命令行参数
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

/// AgentCore Gate - agent 运行时的 invocation 网关
#[derive(Parser, Debug, Default)]
#[command(name = "agentcore-gate")]
#[command(version)]
#[command(about = "提供 /invocations 与 /ping：限流、在途任务统计、会话标识解析", long_about = None)]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, value_name = "FILE", help = "指定配置文件路径")]
    pub config_file: Option<String>,

    /// 服务器监听地址
    #[arg(long, value_name = "ADDRESS", help = "服务器监听地址")]
    pub host: Option<String>,

    /// HTTP 端口
    #[arg(long, value_name = "PORT", help = "HTTP 监听端口")]
    pub port: Option<u16>,

    /// /invocations 限流
    #[arg(long, value_name = "NUM", help = "/invocations 每窗口请求上限（0 表示不限流）")]
    pub invocations_limit: Option<u32>,

    /// /ping 限流
    #[arg(long, value_name = "NUM", help = "/ping 每窗口请求上限（0 表示不限流）")]
    pub ping_limit: Option<u32>,

    /// 限流窗口
    #[arg(long, value_name = "MS", help = "限流窗口长度（毫秒）")]
    pub rate_window_ms: Option<u64>,

    /// 日志级别
    #[arg(
        long,
        value_name = "LEVEL",
        help = "日志级别: trace, debug, info, warn, error"
    )]
    pub log_level: Option<String>,

    /// 日志格式
    #[arg(long, value_name = "FORMAT", help = "日志格式: pretty, json, compact")]
    pub log_format: Option<String>,

    /// 日志文件路径
    #[arg(long, value_name = "PATH", help = "日志输出文件路径")]
    pub log_file: Option<String>,

    /// 启用监控指标
    #[arg(long, help = "启用 Prometheus 监控指标（GET /metrics）")]
    pub enable_metrics: bool,

    /// 详细输出（可重复使用：-v, -vv, -vvv）
    #[arg(short, action = clap::ArgAction::Count, help = "详细输出级别")]
    pub verbose: u8,

    /// 静默模式
    #[arg(long, short = 'q', help = "静默模式（只输出错误）")]
    pub quiet: bool,

    /// 开发模式（等同于 --log-level debug --log-format pretty）
    #[arg(long, help = "启用开发模式")]
    pub dev: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 生成默认配置文件
    GenerateConfig {
        /// 输出文件路径
        #[arg(value_name = "PATH", default_value = "config.toml")]
        path: String,
    },
    /// 验证配置文件
    ValidateConfig {
        /// 配置文件路径
        #[arg(value_name = "PATH", default_value = "config.toml")]
        path: String,
    },
    /// 显示最终配置（合并后的配置）
    ShowConfig,
}

impl Cli {
    /// 获取日志级别（考虑 verbose 和 quiet）
    pub fn get_log_level(&self) -> Option<String> {
        if self.quiet {
            return Some("error".to_string());
        }

        if self.dev {
            return Some("debug".to_string());
        }

        if let Some(level) = &self.log_level {
            return Some(level.clone());
        }

        match self.verbose {
            0 => None, // 使用默认或配置文件
            1 => Some("info".to_string()),
            2 => Some("debug".to_string()),
            _ => Some("trace".to_string()),
        }
    }

    /// 获取日志格式
    pub fn get_log_format(&self) -> Option<String> {
        if self.dev {
            return Some("pretty".to_string());
        }
        self.log_format.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = <Cli as Parser>::parse_from([
            "agentcore-gate",
            "--port",
            "9000",
            "--invocations-limit",
            "2",
            "--ping-limit",
            "0",
            "--rate-window-ms",
            "250",
            "-vv",
        ]);
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.invocations_limit, Some(2));
        assert_eq!(cli.ping_limit, Some(0));
        assert_eq!(cli.rate_window_ms, Some(250));
        assert_eq!(cli.get_log_level().as_deref(), Some("debug"));
    }

    #[test]
    fn test_quiet_wins() {
        let cli = <Cli as Parser>::parse_from(["agentcore-gate", "-q", "--dev"]);
        assert_eq!(cli.get_log_level().as_deref(), Some("error"));
        assert_eq!(cli.get_log_format().as_deref(), Some("pretty"));
    }

    #[test]
    fn test_subcommand() {
        let cli = <Cli as Parser>::parse_from(["agentcore-gate", "validate-config", "gate.toml"]);
        assert!(matches!(
            cli.command,
            Some(Commands::ValidateConfig { ref path }) if path == "gate.toml"
        ));
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = <Cli as Parser>::parse_from(["agentcore-gate", "--ping-limit", "3", "--enable-metrics"]);
        let mut config = crate::config::GateConfig::default();
        config.merge_from_cli(&cli);
        assert_eq!(config.throttle.ping_limit, 3);
        assert!(config.metrics_enabled);
    }
}
