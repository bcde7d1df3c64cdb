use std::sync::Arc;

use anyhow::{Context, Result};
use geofence_core::config::AppConfig;
use geofence_dispatcher::DispatchService;
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle};
use tracing::{error, info};

/// 主应用程序
pub struct Application {
    config: AppConfig,
    service: Arc<DispatchService>,
}

impl Application {
    /// 根据配置构建分发服务，不启动后台处理
    pub async fn new(config: AppConfig) -> Result<Self> {
        let service = DispatchService::builder(config.clone())
            .build()
            .await
            .with_context(|| format!("创建分发服务失败: {}", config.database.url))?;
        service.initialize().await.context("初始化数据库表结构失败")?;

        Ok(Self {
            config,
            service: Arc::new(service),
        })
    }

    pub fn service(&self) -> &Arc<DispatchService> {
        &self.service
    }

    /// 启动分发服务和可选的API服务器，收到关闭信号后依次停止
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.service.start().await.context("启动分发服务失败")?;

        let api_handle = match self.start_api(shutdown_rx.resubscribe()).await {
            Ok(handle) => handle,
            Err(e) => {
                self.service.shutdown().await.context("关闭分发服务失败")?;
                return Err(e);
            }
        };

        let _ = shutdown_rx.recv().await;
        info!("应用收到关闭信号");

        if let Some(handle) = api_handle {
            match handle.await {
                Ok(Ok(())) => info!("API服务器已停止"),
                Ok(Err(e)) => error!("API服务器异常退出: {}", e),
                Err(e) => error!("等待API服务器停止时出错: {}", e),
            }
        }

        self.service.shutdown().await.context("关闭分发服务失败")?;
        info!("应用已停止");
        Ok(())
    }

    async fn start_api(
        &self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<Option<JoinHandle<std::io::Result<()>>>> {
        if !self.config.api.enabled {
            return Ok(None);
        }

        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定API地址失败: {}", self.config.api.bind_address))?;
        let service = Arc::clone(&self.service);
        let api_config = self.config.api.clone();

        Ok(Some(tokio::spawn(async move {
            geofence_api::serve(listener, service, &api_config, async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
        })))
    }
}
