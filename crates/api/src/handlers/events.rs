use axum::{extract::State, response::IntoResponse, Json};
use geofence_domain::TransitionType;
use serde::Deserialize;

use crate::{error::ApiResult, response::accepted, routes::AppState};

/// 平台层上报的原始状态变化
#[derive(Debug, Deserialize)]
pub struct RawEventRequest {
    pub region_id: String,
    pub transition: TransitionType,
    /// 事件时间（毫秒时间戳）
    #[serde(alias = "timestamp_ms")]
    pub timestamp: i64,
}

/// 受理一次围栏事件，未注册的区域返回 `data: null`
pub async fn submit_event(
    State(state): State<AppState>,
    Json(request): Json<RawEventRequest>,
) -> ApiResult<impl IntoResponse> {
    let entry = state
        .service
        .on_raw_event(&request.region_id, request.transition, request.timestamp)
        .await?;

    let message = match &entry {
        Some(entry) => format!("事件已入队: {}", entry.id),
        None => format!("区域 {} 的事件已丢弃", request.region_id),
    };
    Ok(accepted(entry, message))
}
