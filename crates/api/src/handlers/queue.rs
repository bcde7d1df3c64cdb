use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use geofence_domain::QueueStats;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

const MAX_DEAD_LETTER_LIMIT: usize = 1_000;

#[derive(Debug, Serialize)]
pub struct QueueOverview {
    pub queue: QueueStats,
    pub worker_running: bool,
    pub delivered: u64,
    pub failed: u64,
    pub dead_lettered: u64,
}

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    pub limit: Option<usize>,
}

pub async fn get_queue_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let queue = state.service.queue().stats().await?;
    let worker = state.service.worker();
    let worker_stats = worker.stats();

    Ok(success(QueueOverview {
        queue,
        worker_running: worker.is_running().await,
        delivered: worker_stats.delivered,
        failed: worker_stats.failed,
        dead_lettered: worker_stats.dead_lettered,
    }))
}

pub async fn list_dead_letters(
    State(state): State<AppState>,
    Query(params): Query<DeadLetterQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = params.limit.unwrap_or(100);
    if limit == 0 || limit > MAX_DEAD_LETTER_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "limit 必须在 1 到 {MAX_DEAD_LETTER_LIMIT} 之间"
        )));
    }

    let entries = state.service.queue().list_dead_letters(limit).await?;
    Ok(success(entries))
}

/// 将死信条目重新放回队列
pub async fn requeue_dead_letter(
    State(state): State<AppState>,
    Path(entry_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let entry = state.service.queue().requeue_dead(entry_id).await?;
    state.service.worker().wake();
    Ok(success(entry))
}
