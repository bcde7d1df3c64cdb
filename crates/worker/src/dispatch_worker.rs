use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{stream, FutureExt, StreamExt};
use geofence_core::{config::WorkerConfig, GeofenceError, GeofenceResult};
use geofence_domain::{EventQueue, FailureOutcome, QueueEntry};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::handler_registry::HandlerRegistry;

/// Worker 生命周期内的投递统计
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct WorkerStats {
    pub delivered: u64,
    pub failed: u64,
    pub dead_lettered: u64,
}

#[derive(Default)]
struct WorkerCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dead_lettered: AtomicU64,
}

struct DispatchContext {
    queue: Arc<dyn EventQueue>,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
    counters: WorkerCounters,
}

/// 单实例后台分发器
///
/// 按批次取出到期条目，在有界并发与超时限制下调用入队时绑定的处理器，
/// 然后确认投递或记录失败。队列为空时等待入队通知或轮询间隔。
pub struct DispatchWorker {
    context: Arc<DispatchContext>,
    notifier: Arc<Notify>,
    shutdown_tx: Arc<RwLock<Option<broadcast::Sender<()>>>>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    is_running: Arc<RwLock<bool>>,
}

impl DispatchWorker {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        registry: Arc<HandlerRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            context: Arc::new(DispatchContext {
                queue,
                registry,
                config,
                counters: WorkerCounters::default(),
            }),
            notifier: Arc::new(Notify::new()),
            shutdown_tx: Arc::new(RwLock::new(None)),
            loop_handle: Mutex::new(None),
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    /// 与队列共享入队通知
    pub fn with_notifier(mut self, notifier: Arc<Notify>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notifier)
    }

    /// 唤醒等待中的分发循环
    pub fn wake(&self) {
        self.notifier.notify_one();
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.context.registry
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn stats(&self) -> WorkerStats {
        let counters = &self.context.counters;
        WorkerStats {
            delivered: counters.delivered.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            dead_lettered: counters.dead_lettered.load(Ordering::Relaxed),
        }
    }

    pub async fn start(&self) -> GeofenceResult<()> {
        let mut is_running = self.is_running.write().await;
        if *is_running {
            return Err(GeofenceError::AlreadyRunning("分发Worker".to_string()));
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        {
            let mut tx = self.shutdown_tx.write().await;
            *tx = Some(shutdown_tx);
        }

        let context = Arc::clone(&self.context);
        let notifier = Arc::clone(&self.notifier);
        let handle = tokio::spawn(Self::run_loop(context, notifier, shutdown_rx));
        *self.loop_handle.lock().await = Some(handle);

        *is_running = true;
        info!(
            "分发Worker已启动 (批次: {}, 并发: {}, 超时: {}ms)",
            self.context.config.batch_size,
            self.context.config.max_concurrency,
            self.context.config.handler_timeout_ms
        );
        Ok(())
    }

    /// 发送停止信号，等待当前批次完成后返回
    pub async fn stop(&self) -> GeofenceResult<()> {
        let mut is_running = self.is_running.write().await;
        if !*is_running {
            return Ok(());
        }

        info!("停止分发Worker");
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.loop_handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!("分发循环异常退出: {}", e);
            }
        }

        *is_running = false;
        info!("分发Worker已停止");
        Ok(())
    }

    async fn run_loop(
        context: Arc<DispatchContext>,
        notifier: Arc<Notify>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let poll_interval = Duration::from_millis(context.config.poll_interval_ms);

        loop {
            if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
                break;
            }

            let processed = match Self::process_batch(&context).await {
                Ok(count) => count,
                Err(e) => {
                    error!("取出待投递条目失败: {}", e);
                    0
                }
            };

            // 本批次有数据时立即尝试下一批
            if processed > 0 {
                continue;
            }

            tokio::select! {
                _ = notifier.notified() => {
                    debug!("收到入队通知");
                }
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        debug!("分发循环已退出");
    }

    async fn process_batch(context: &Arc<DispatchContext>) -> GeofenceResult<usize> {
        let entries = context.queue.dequeue_batch(context.config.batch_size).await?;
        let count = entries.len();
        if count == 0 {
            return Ok(0);
        }

        debug!("开始处理 {} 个条目", count);
        let shared = Arc::clone(context);
        stream::iter(entries)
            .for_each_concurrent(context.config.max_concurrency, move |entry| {
                Self::dispatch_entry(Arc::clone(&shared), entry)
            })
            .await;

        Ok(count)
    }

    async fn dispatch_entry(context: Arc<DispatchContext>, entry: QueueEntry) {
        let failure = match context.registry.get(&entry.handler_id).await {
            Some(handler) => {
                let timeout_ms = context.config.handler_timeout_ms;
                let started = Instant::now();
                let invocation = AssertUnwindSafe(handler.handle(&entry.event)).catch_unwind();
                let result = tokio::time::timeout(Duration::from_millis(timeout_ms), invocation).await;
                metrics::histogram!("geofence_handler_duration_ms")
                    .record(started.elapsed().as_secs_f64() * 1000.0);

                match result {
                    Ok(Ok(Ok(()))) => None,
                    Ok(Ok(Err(failure))) => Some(failure.into_error(&entry.handler_id)),
                    Ok(Err(_)) => Some(GeofenceError::HandlerError {
                        handler_id: entry.handler_id.clone(),
                        message: "处理器发生panic".to_string(),
                        permanent: false,
                    }),
                    Err(_) => Some(GeofenceError::HandlerTimeout {
                        handler_id: entry.handler_id.clone(),
                        timeout_ms,
                    }),
                }
            }
            None => Some(GeofenceError::handler_not_found(&entry.handler_id)),
        };

        match failure {
            None => match context.queue.mark_delivered(entry.id).await {
                Ok(()) => {
                    context.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("geofence_events_delivered_total").increment(1);
                }
                Err(e) => error!("确认投递失败, 条目 {}: {}", entry.id, e),
            },
            Some(error) => {
                debug!("{} 投递失败: {}", entry.entity_description(), error);
                match context.queue.mark_failed(entry.id, &error).await {
                    Ok(FailureOutcome::Retrying { .. }) => {
                        context.counters.failed.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!("geofence_events_retried_total").increment(1);
                    }
                    Ok(FailureOutcome::DeadLettered { .. }) => {
                        context.counters.failed.fetch_add(1, Ordering::Relaxed);
                        context.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!("geofence_events_dead_lettered_total").increment(1);
                    }
                    Ok(FailureOutcome::AlreadyTerminal(status)) => {
                        warn!("条目 {} 已处于终态 {}, 忽略本次失败", entry.id, status);
                    }
                    Err(e) => error!("记录投递失败出错, 条目 {}: {}", entry.id, e),
                }
            }
        }
    }
}
