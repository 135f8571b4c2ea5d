use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dispatch_config::{AppConfig, CoordinationBackendType, LogLevel, OutputFormat};
use dispatch_infrastructure::{init_structured_logging, JsonMessageSerializer};
use excalibur_dispatch::{builtin, Application, ShutdownManager};
use tokio::signal;
use tracing::{error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// 消息分发宿主进程
#[derive(Debug, Parser)]
#[command(name = "dispatch-host", version, about = "消息分发宿主：定时消息、CRON作业与分布式协调")]
struct Cli {
    /// 配置文件路径，缺省时按默认位置查找
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_name = "FORMAT", value_parser = ["json", "pretty", "compact"])]
    log_format: Option<String>,

    /// 协调后端，覆盖配置文件
    #[arg(long, value_name = "BACKEND", value_parser = ["memory", "redis"])]
    backend: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载默认配置失败".to_string(),
    })?;
    apply_overrides(&mut config, &cli)?;

    init_structured_logging(&config.logging).context("初始化日志系统失败")?;

    info!("启动消息分发宿主");
    if let Some(path) = &cli.config {
        info!("配置文件: {path}");
    }
    info!("协调后端: {:?}", config.coordination.backend);

    let app = Application::builder(config)
        .with_handlers(builtin::register_handlers)
        .with_serializer(builtin::register_messages(JsonMessageSerializer::new()))
        .build()
        .await
        .context("初始化应用程序失败")?;
    let app = Arc::new(app);

    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe().await;
        let app = Arc::clone(&app);

        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("应用运行失败: {e}");
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");

    let drained = shutdown_manager
        .shutdown_and_drain(
            async move {
                if let Err(e) = app_handle.await {
                    error!("应用任务异常退出: {e}");
                }
            },
            SHUTDOWN_GRACE,
        )
        .await;

    if !drained {
        warn!("部分组件未在规定时间内停止");
    }

    info!("消息分发宿主已关闭");
    Ok(())
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) -> Result<()> {
    if let Some(level) = &cli.log_level {
        config.logging.level = level.parse::<LogLevel>().map_err(anyhow::Error::msg)?;
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.parse::<OutputFormat>().map_err(anyhow::Error::msg)?;
    }
    if let Some(backend) = &cli.backend {
        config.coordination.backend = backend
            .parse::<CoordinationBackendType>()
            .map_err(anyhow::Error::msg)?;
    }
    Ok(())
}

/// 等待 Ctrl+C 或 SIGTERM
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("监听Ctrl+C信号失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
