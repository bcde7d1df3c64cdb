use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use geofence_core::config::AppConfig;
use geofence_dispatch::{
    app::Application,
    cli::{Cli, Command},
    shutdown::{wait_for_signal, ShutdownManager},
    telemetry,
};
use geofence_domain::{Coordinates, GeofenceRegion};
use serde::Serialize;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载配置失败".to_string(),
    })?;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.observability.log_format = format.into();
    }

    telemetry::init_logging(&config.observability)?;

    match cli.command {
        Command::Run => run(config).await,
        command => execute(config, command).await,
    }
}

async fn run(config: AppConfig) -> Result<()> {
    telemetry::init_metrics(&config.observability)?;
    info!("启动地理围栏事件分发服务, 数据库: {}", config.database.url);

    let app = Arc::new(Application::new(config).await?);
    let shutdown_manager = ShutdownManager::new();

    let mut app_handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown_manager.subscribe().await;
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    tokio::select! {
        _ = wait_for_signal() => {
            info!("开始优雅关闭...");
        }
        result = &mut app_handle => {
            // 启动失败时应用会提前退出
            return result.context("应用任务异常终止")?;
        }
    }

    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(Ok(()))) => info!("应用已优雅关闭"),
        Ok(Ok(Err(e))) => error!("应用关闭时发生错误: {e:#}"),
        Ok(Err(e)) => error!("应用任务异常终止: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    Ok(())
}

/// 执行一次性运维命令，结果以JSON输出到标准输出
async fn execute(config: AppConfig, command: Command) -> Result<()> {
    let app = Application::new(config).await?;
    let service = app.service();

    let result = match command {
        Command::Run => Err(anyhow::anyhow!("run 命令不能作为一次性命令执行")),
        Command::Register {
            region_id,
            latitude,
            longitude,
            radius,
            transitions,
            handler_id,
            loitering_delay_ms,
        } => {
            let center = Coordinates::new(latitude, longitude)?;
            let mut region = GeofenceRegion::new(region_id, center, radius, transitions)?;
            if let Some(delay) = loitering_delay_ms {
                region = region.with_loitering_delay(delay);
            }
            let registration = service.registrations().register(&region, &handler_id).await?;
            print_json(&registration)
        }
        Command::Unregister { region_id } => {
            let removed = service.registrations().unregister(&region_id).await?;
            print_json(&serde_json::json!({ "region_id": region_id, "removed": removed }))
        }
        Command::Regions => print_json(&service.registrations().list().await?),
        Command::Emit {
            region_id,
            transition,
            timestamp,
        } => {
            let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
            let entry = service.on_raw_event(&region_id, transition, timestamp).await?;
            if entry.is_none() {
                warn!("事件未入队: 区域 {} 未注册或未监控 {}", region_id, transition);
            }
            print_json(&entry)
        }
        Command::Stats => print_json(&service.queue().stats().await?),
        Command::DeadLetters { limit, requeue } => match requeue {
            Some(entry_id) => print_json(&service.queue().requeue_dead(entry_id).await?),
            None => print_json(&service.queue().list_dead_letters(limit).await?),
        },
    };

    service.shutdown().await?;
    result
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value).context("序列化输出失败")?;
    println!("{output}");
    Ok(())
}
