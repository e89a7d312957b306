use std::fs;
use std::process;
use std::sync::Arc;

use agentcore_gate::{
    cli::{Cli, Commands},
    config::{self, GateConfig},
    handler_fn, infra, logging, GateHttpServer, HandlerError, InvocationContext, InvocationGate,
    InvocationHandler, InvocationRequest, InvocationResponse,
};
use anyhow::{Context, Result};
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件（如果存在）
    let _ = dotenvy::dotenv();

    // 解析命令行参数
    let cli = Cli::parse();

    // 处理子命令
    if let Some(command) = &cli.command {
        match command {
            Commands::GenerateConfig { path } => return generate_config(path),
            Commands::ValidateConfig { path } => return validate_config(path),
            Commands::ShowConfig => return show_config(&cli),
        }
    }

    // 快速读取 config.toml 的 [logging] 段与 AGENTCORE_LOG_LEVEL（不加载完整配置）
    let early_log = config::load_early_logging_config(cli.config_file.as_deref());

    // 合并日志配置（优先级：CLI > 环境变量 > config.toml > 默认值）
    let log_level = early_log.resolve_level(cli.get_log_level());
    let log_format = cli.get_log_format().or(early_log.format);
    let log_file = cli.log_file.clone().or(early_log.file);

    let _log_guard = logging::init_logging(
        &log_level,
        log_format.as_deref(),
        log_file.as_deref(),
        cli.quiet,
    )?;

    tracing::info!("🚀 AgentCore Gate starting...");

    // 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    let config = GateConfig::load(&cli).context("加载配置失败")?;

    if cli.dev {
        tracing::info!("🔧 开发模式已启用");
    }

    // 显示配置信息
    tracing::info!("📊 Gate Configuration:");
    tracing::info!("  - Listen: {}", config.bind_address());
    tracing::info!(
        "  - /invocations limit: {} per {}ms",
        config.throttle.invocations_limit,
        config.throttle.window_ms
    );
    tracing::info!(
        "  - /ping limit: {} per {}ms",
        config.throttle.ping_limit,
        config.throttle.window_ms
    );
    tracing::info!("  - Throttle scope: {:?}", config.throttle.scope);
    tracing::info!("  - Busy threshold: {}", config.ping.busy_threshold);
    tracing::info!("  - Session header: {}", config.identity.session_header);
    tracing::info!("  - Metrics: {}", config.metrics_enabled);
    tracing::info!("  - Log Level: {}", log_level);
    if let Some(f) = &log_file {
        tracing::info!("  - Log File: {}", f);
    }

    if config.metrics_enabled {
        infra::metrics::init().map_err(|e| anyhow::anyhow!("初始化 Prometheus 指标失败: {}", e))?;
        tracing::info!("📈 Prometheus 指标已启用: GET /metrics");
    }

    // 构建网关（handler 数量不对时在这里失败，不会开始接收请求）
    let gate = match InvocationGate::builder()
        .config(&config)
        .and_then(|builder| builder.handler(echo_handler()))
        .and_then(|builder| builder.build())
    {
        Ok(gate) => Arc::new(gate),
        Err(e) => {
            tracing::error!("❌ 网关初始化失败: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = GateHttpServer::new(gate, &config).start().await {
        tracing::error!("❌ 服务器运行失败: {}", e);
        process::exit(1);
    }

    Ok(())
}

/// 默认 handler：回显请求体与会话信息
fn echo_handler() -> impl InvocationHandler {
    handler_fn(
        |request: InvocationRequest, context: InvocationContext| async move {
            let payload: Value = request.json()?;
            Ok::<_, HandlerError>(InvocationResponse::Json(json!({
                "echo": payload,
                "conversation_id": context.conversation_id(),
                "request_id": context.request_id(),
            })))
        },
    )
}

/// 生成默认配置文件
fn generate_config(path: &str) -> Result<()> {
    let default_config = r#"# AgentCore Gate 配置文件
# 此文件由 agentcore-gate generate-config 生成

[server]
host = "0.0.0.0"
port = 8080
max_body_bytes = 10485760

[throttle]
# 每窗口请求上限，0 表示不限流
invocations_limit = 0
ping_limit = 0
window_ms = 1000
# global: 全进程共享一个窗口；client: 按客户端地址分别计数
scope = "global"
idle_windows = 60

[ping]
# 在途任务数超过该值时上报 HealthyBusy
busy_threshold = 0

[identity]
session_header = "X-Amzn-Bedrock-AgentCore-Runtime-Session-Id"

[metrics]
enabled = false

[logging]
level = "info"
format = "compact"
# file = "./logs/gate.log"
"#;

    fs::write(path, default_config).with_context(|| format!("无法写入配置文件: {}", path))?;

    println!("✅ 配置文件已生成: {}", path);
    Ok(())
}

/// 验证配置文件
fn validate_config(path: &str) -> Result<()> {
    let config = GateConfig::from_toml_file(path)
        .and_then(|config| config.validate().map(|_| config))
        .with_context(|| format!("配置文件验证失败: {}", path))?;

    println!("✅ 配置文件有效: {}", path);
    println!("📊 配置摘要:");
    println!("  - Listen: {}", config.bind_address());
    println!("  - /invocations limit: {}", config.throttle.invocations_limit);
    println!("  - /ping limit: {}", config.throttle.ping_limit);
    println!("  - Window: {}ms", config.throttle.window_ms);

    Ok(())
}

/// 显示最终配置（合并后的配置）
fn show_config(cli: &Cli) -> Result<()> {
    let _guard = logging::init_logging("info", None, None, false)?;

    let config = GateConfig::load(cli).context("加载配置失败")?;

    println!("📊 最终配置（合并后的配置）:");
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}
