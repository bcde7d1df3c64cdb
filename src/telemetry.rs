use std::net::SocketAddr;

use anyhow::{Context, Result};
use geofence_core::config::{LogFormat, ObservabilityConfig};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志系统，`RUST_LOG` 优先于配置中的级别
///
/// 日志写入标准错误，标准输出留给命令结果。
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .context("初始化JSON日志格式失败")?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init()
            .context("初始化Pretty日志格式失败")?,
    }

    Ok(())
}

/// 配置了导出地址时安装 Prometheus 导出器
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let Some(address) = config.metrics_bind_address.as_deref() else {
        return Ok(());
    };

    let address: SocketAddr = address
        .parse()
        .with_context(|| format!("无效的指标导出地址: {address}"))?;
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .context("安装Prometheus导出器失败")?;

    metrics::describe_counter!("geofence_events_enqueued_total", "已入队的围栏事件数");
    metrics::describe_counter!("geofence_events_dropped_total", "被丢弃的围栏事件数");
    metrics::describe_counter!("geofence_events_delivered_total", "投递成功的事件数");
    metrics::describe_counter!("geofence_events_retried_total", "安排重试的投递次数");
    metrics::describe_counter!("geofence_events_dead_lettered_total", "进入死信的事件数");
    metrics::describe_histogram!("geofence_handler_duration_ms", "处理器执行耗时（毫秒）");

    info!("Prometheus指标导出于 {}", address);
    Ok(())
}
