use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use geofence_core::{config::AppConfig, GeofenceError, GeofenceResult};
use geofence_domain::{
    DeadLetterObserver, EventHandler, EventQueue, QueueEntry, RegistrationStore, RetryPolicy,
    TransitionEvent, TransitionType,
};
use geofence_infrastructure::DatabaseManager;
use geofence_worker::{DispatchWorker, HandlerRegistry};
use tokio::sync::{Mutex, Notify, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cleanup_service::{CleanupConfig, CleanupService};
use crate::dead_letter::LoggingDeadLetterObserver;

/// 分发服务构建器
pub struct DispatchServiceBuilder {
    config: AppConfig,
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    dead_letter_observer: Option<Arc<dyn DeadLetterObserver>>,
}

impl DispatchServiceBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            handlers: HashMap::new(),
            dead_letter_observer: None,
        }
    }

    /// 注册应用层处理器，与配置文件中的同名处理器冲突时以此为准
    pub fn handler(mut self, handler_id: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(handler_id.into(), handler);
        self
    }

    /// 设置死信观察者，默认仅记录日志
    pub fn dead_letter_observer(mut self, observer: Arc<dyn DeadLetterObserver>) -> Self {
        self.dead_letter_observer = Some(observer);
        self
    }

    pub async fn build(self) -> GeofenceResult<DispatchService> {
        let config = self.config;
        config
            .validate()
            .map_err(|e| GeofenceError::config_error(format!("{e:#}")))?;
        let database = Arc::new(DatabaseManager::new(&config.database).await?);

        let registry = Arc::new(HandlerRegistry::from_configs(&config.handlers)?);
        for (handler_id, handler) in self.handlers {
            registry.register(handler_id, handler).await;
        }

        let observer = self
            .dead_letter_observer
            .unwrap_or_else(|| Arc::new(LoggingDeadLetterObserver) as Arc<dyn DeadLetterObserver>);
        let notifier = Arc::new(Notify::new());

        let queue: Arc<dyn EventQueue> = Arc::new(
            database
                .event_queue(RetryPolicy::from(&config.queue), Some(observer))
                .with_work_notifier(Arc::clone(&notifier)),
        );
        let registrations: Arc<dyn RegistrationStore> = Arc::new(database.registration_store());

        let worker = DispatchWorker::new(Arc::clone(&queue), registry, config.worker.clone())
            .with_notifier(notifier);
        let cleanup = CleanupService::new(Arc::clone(&queue), CleanupConfig::from(&config.queue));

        Ok(DispatchService {
            dedup_window_ms: config.queue.dedup_window_ms,
            database,
            registrations,
            queue,
            worker,
            cleanup: Mutex::new(cleanup),
            migrated: OnceCell::new(),
            lifecycle: Mutex::new(()),
            running: AtomicBool::new(false),
        })
    }
}

/// 地理围栏事件分发服务
///
/// 接收平台层的原始状态变化通知，解析区域绑定后持久化入队，并管理后台分发Worker。
/// 入站路径从不等待处理器执行。
pub struct DispatchService {
    dedup_window_ms: i64,
    database: Arc<DatabaseManager>,
    registrations: Arc<dyn RegistrationStore>,
    queue: Arc<dyn EventQueue>,
    worker: DispatchWorker,
    cleanup: Mutex<CleanupService>,
    /// 表结构就绪状态，与生命周期锁分离，入站路径只依赖它
    migrated: OnceCell<()>,
    /// 串行化 start/stop
    lifecycle: Mutex<()>,
    running: AtomicBool,
}

impl DispatchService {
    pub fn builder(config: AppConfig) -> DispatchServiceBuilder {
        DispatchServiceBuilder::new(config)
    }

    /// 确保表结构已就绪，可重复调用
    pub async fn initialize(&self) -> GeofenceResult<()> {
        self.migrated
            .get_or_try_init(|| self.database.migrate())
            .await?;
        Ok(())
    }

    /// 启动服务，已运行时为空操作
    pub async fn start(&self) -> GeofenceResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.running.load(Ordering::Acquire) {
            debug!("分发服务已在运行");
            return Ok(());
        }

        self.initialize().await?;

        let recovered = self.queue.recover_in_flight().await?;
        if recovered > 0 {
            warn!("上次运行中断, 已恢复 {} 个投递中条目", recovered);
        }

        self.worker.start().await?;
        if let Err(e) = self.cleanup.lock().await.start().await {
            let _ = self.worker.stop().await;
            return Err(e);
        }

        self.running.store(true, Ordering::Release);
        let stats = self.queue.stats().await?;
        info!(
            "地理围栏分发服务已启动 (待投递: {}, 死信: {})",
            stats.pending, stats.dead
        );
        Ok(())
    }

    /// 停止后台处理，已入队的条目保持不变
    pub async fn stop(&self) -> GeofenceResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.running.load(Ordering::Acquire) {
            return Ok(());
        }

        self.cleanup.lock().await.stop().await?;
        self.worker.stop().await?;
        self.running.store(false, Ordering::Release);
        info!("地理围栏分发服务已停止");
        Ok(())
    }

    /// 停止服务并关闭数据库连接
    pub async fn shutdown(&self) -> GeofenceResult<()> {
        self.stop().await?;
        self.database.close().await;
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 处理一次原始状态变化通知
    ///
    /// 未注册的区域或区域未监控的变化类型会被记录并丢弃，返回 `Ok(None)`。
    /// 入队成功后唤醒分发Worker，不等待处理器执行。
    pub async fn on_raw_event(
        &self,
        region_id: &str,
        transition: TransitionType,
        timestamp_ms: i64,
    ) -> GeofenceResult<Option<QueueEntry>> {
        self.initialize().await?;

        let registration = match self.registrations.resolve(region_id).await {
            Ok(registration) => registration,
            Err(GeofenceError::UnresolvedRegion { .. }) => {
                warn!(
                    "收到未注册区域的事件, 已丢弃: region={}, transition={}, timestamp={}",
                    region_id, transition, timestamp_ms
                );
                metrics::counter!("geofence_events_dropped_total", "reason" => "unresolved_region")
                    .increment(1);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !registration.region.monitors(transition) {
            warn!(
                "区域 {} 未监控 {} 事件, 已丢弃",
                region_id, transition
            );
            metrics::counter!("geofence_events_dropped_total", "reason" => "transition_not_monitored")
                .increment(1);
            return Ok(None);
        }

        let event = TransitionEvent::new(region_id, transition, timestamp_ms, self.dedup_window_ms);
        let entry = self.queue.enqueue(&event, &registration.handler_id).await?;
        metrics::counter!("geofence_events_enqueued_total").increment(1);
        self.worker.wake();

        debug!("事件已受理: {}", entry.entity_description());
        Ok(Some(entry))
    }

    /// 平台回调使用的即发即忘入口，错误只记录不返回
    pub fn notify_raw_event(
        self: &Arc<Self>,
        region_id: impl Into<String>,
        transition: TransitionType,
        timestamp_ms: i64,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let region_id = region_id.into();
        tokio::spawn(async move {
            if let Err(e) = service.on_raw_event(&region_id, transition, timestamp_ms).await {
                error!(
                    "受理围栏事件失败: region={}, transition={}: {}",
                    region_id, transition, e
                );
            }
        })
    }

    pub fn registrations(&self) -> Arc<dyn RegistrationStore> {
        Arc::clone(&self.registrations)
    }

    pub fn queue(&self) -> Arc<dyn EventQueue> {
        Arc::clone(&self.queue)
    }

    pub fn worker(&self) -> &DispatchWorker {
        &self.worker
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        self.worker.registry()
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.database
    }

    /// 手动执行一次已投递条目清理
    pub async fn purge_expired(&self) -> GeofenceResult<u64> {
        self.cleanup.lock().await.cleanup_once().await
    }
}
