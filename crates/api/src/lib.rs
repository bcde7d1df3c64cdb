//! # Geofence API
//!
//! 地理围栏分发服务的HTTP接口，基于Axum构建。
//!
//! ## API 端点
//!
//! - `GET /health` - 健康检查
//! - `POST /api/events` - 上报原始围栏事件
//! - `GET /api/regions` - 已注册区域列表
//! - `PUT /api/regions/{id}` - 注册或覆盖区域
//! - `DELETE /api/regions/{id}` - 注销区域
//! - `GET /api/queue/stats` - 队列与Worker统计
//! - `GET /api/queue/dead-letters` - 死信列表
//! - `POST /api/queue/dead-letters/{id}/requeue` - 重新投递死信
//!
//! 所有成功响应使用统一的 [`response::ApiResponse`] 包装，错误通过 [`error::ApiError`] 映射到HTTP状态码。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use std::future::Future;
use std::sync::Arc;

use geofence_core::config::ApiConfig;
use geofence_dispatcher::DispatchService;
use tokio::net::TcpListener;
use tracing::info;

pub use error::{ApiError, ApiResult};
pub use routes::{create_routes, AppState};

/// 创建完整的应用路由
pub fn create_app(service: Arc<DispatchService>, config: &ApiConfig) -> axum::Router {
    create_routes(AppState::new(service), config.cors_enabled)
}

/// 在已绑定的监听器上运行HTTP服务，直到 `shutdown` 完成
pub async fn serve<F>(
    listener: TcpListener,
    service: Arc<DispatchService>,
    config: &ApiConfig,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("API服务监听于 {}", listener.local_addr()?);

    axum::serve(listener, create_app(service, config))
        .with_graceful_shutdown(shutdown)
        .await
}
