use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use geofence_core::{config::QueueConfig, GeofenceResult};
use geofence_domain::EventQueue;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 已投递条目清理配置
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupConfig {
    /// 清理间隔（秒）
    pub cleanup_interval_seconds: u64,
    /// 已投递条目保留时间（秒）
    pub retention_seconds: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_seconds: 3600, // 1小时
            retention_seconds: 86_400,      // 24小时
        }
    }
}

impl From<&QueueConfig> for CleanupConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            cleanup_interval_seconds: config.cleanup_interval_seconds,
            retention_seconds: config.retention_seconds,
        }
    }
}

/// 已投递条目清理服务
///
/// 周期性删除超过保留时间的已投递条目，防止队列表无限增长。死信条目不会被清理。
pub struct CleanupService {
    queue: Arc<dyn EventQueue>,
    config: CleanupConfig,
    shutdown_tx: Option<oneshot::Sender<()>>,
    cleanup_handle: Option<JoinHandle<()>>,
}

impl CleanupService {
    pub fn new(queue: Arc<dyn EventQueue>, config: CleanupConfig) -> Self {
        Self {
            queue,
            config,
            shutdown_tx: None,
            cleanup_handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.cleanup_handle.is_some()
    }

    pub async fn start(&mut self) -> GeofenceResult<()> {
        if self.is_running() {
            return Ok(());
        }

        info!(
            "启动清理服务: 间隔 {}s, 保留 {}s",
            self.config.cleanup_interval_seconds, self.config.retention_seconds
        );

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let queue = Arc::clone(&self.queue);
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut cleanup_interval =
                interval(StdDuration::from_secs(config.cleanup_interval_seconds.max(1)));
            cleanup_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cleanup_interval.tick() => {
                        if let Err(e) = Self::perform_cleanup(queue.as_ref(), &config).await {
                            error!("清理已投递条目失败: {}", e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        debug!("清理服务收到停止信号");
                        break;
                    }
                }
            }
        });

        self.cleanup_handle = Some(handle);
        Ok(())
    }

    pub async fn stop(&mut self) -> GeofenceResult<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.cleanup_handle.take() {
            if let Err(e) = handle.await {
                warn!("等待清理服务停止时出错: {}", e);
            }
            info!("清理服务已停止");
        }

        Ok(())
    }

    /// 立即执行一次清理，返回删除数量
    pub async fn cleanup_once(&self) -> GeofenceResult<u64> {
        Self::perform_cleanup(self.queue.as_ref(), &self.config).await
    }

    async fn perform_cleanup(queue: &dyn EventQueue, config: &CleanupConfig) -> GeofenceResult<u64> {
        let cutoff = i64::try_from(config.retention_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let purged = queue.purge_delivered(cutoff).await?;

        if purged > 0 {
            info!("清理了 {} 个超过保留期的已投递条目", purged);
        }
        Ok(purged)
    }
}
