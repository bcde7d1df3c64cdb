use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use geofence_core::{config::HandlerConfig, config::HandlerKind, GeofenceError, GeofenceResult};
use geofence_domain::EventHandler;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::handlers::{LoggingHandler, WebhookHandler};

/// 处理器ID到处理器实例的映射
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置创建内置处理器
    pub fn from_configs(configs: &[HandlerConfig]) -> GeofenceResult<Self> {
        let mut handlers: HashMap<String, Arc<dyn EventHandler>> = HashMap::new();

        for config in configs {
            let handler: Arc<dyn EventHandler> = match config.kind {
                HandlerKind::Logging => Arc::new(LoggingHandler::new(&config.id)),
                HandlerKind::Webhook => {
                    let url = config.url.as_deref().ok_or_else(|| {
                        GeofenceError::config_error(format!("webhook处理器 {} 缺少url", config.id))
                    })?;
                    let handler = WebhookHandler::new(
                        &config.id,
                        url,
                        config.timeout_ms.map(Duration::from_millis),
                    )
                    .map_err(|e| {
                        GeofenceError::config_error(format!("创建webhook处理器 {} 失败: {e}", config.id))
                    })?;
                    Arc::new(handler)
                }
            };

            info!("创建处理器: {} ({:?})", config.id, config.kind);
            handlers.insert(config.id.clone(), handler);
        }

        Ok(Self {
            handlers: RwLock::new(handlers),
        })
    }

    /// 注册处理器，同名处理器会被替换
    pub async fn register(&self, handler_id: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let handler_id = handler_id.into();
        let mut handlers = self.handlers.write().await;
        if handlers.insert(handler_id.clone(), handler).is_some() {
            warn!("处理器 {} 已被替换", handler_id);
        }
    }

    pub async fn unregister(&self, handler_id: &str) -> bool {
        self.handlers.write().await.remove(handler_id).is_some()
    }

    pub async fn get(&self, handler_id: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.read().await.get(handler_id).cloned()
    }

    pub async fn contains(&self, handler_id: &str) -> bool {
        self.handlers.read().await.contains_key(handler_id)
    }

    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}
