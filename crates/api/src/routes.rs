use axum::{
    middleware::from_fn,
    routing::{get, post, put},
    Router,
};
use geofence_dispatcher::DispatchService;
use std::sync::Arc;

use crate::handlers::{
    events::submit_event,
    health::health_check,
    queue::{get_queue_stats, list_dead_letters, requeue_dead_letter},
    regions::{list_regions, register_region, unregister_region},
};
use crate::middleware::{cors_layer, request_logging, trace_layer};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DispatchService>,
}

impl AppState {
    pub fn new(service: Arc<DispatchService>) -> Self {
        Self { service }
    }
}

/// 创建API路由
pub fn create_routes(state: AppState, cors_enabled: bool) -> Router {
    let router = Router::new()
        // 健康检查
        .route("/health", get(health_check))
        // 事件受理
        .route("/api/events", post(submit_event))
        // 区域注册
        .route("/api/regions", get(list_regions))
        .route(
            "/api/regions/{id}",
            put(register_region).delete(unregister_region),
        )
        // 队列运维
        .route("/api/queue/stats", get(get_queue_stats))
        .route("/api/queue/dead-letters", get(list_dead_letters))
        .route(
            "/api/queue/dead-letters/{id}/requeue",
            post(requeue_dead_letter),
        )
        .with_state(state)
        .layer(from_fn(request_logging))
        .layer(trace_layer());

    if cors_enabled {
        router.layer(cors_layer())
    } else {
        router
    }
}
