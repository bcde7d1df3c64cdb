use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use geofence_domain::{Coordinates, GeofenceRegion, TransitionType};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RegisterRegionRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    pub transitions: Vec<TransitionType>,
    pub handler_id: String,
    #[serde(default)]
    pub loitering_delay_ms: Option<u32>,
}

pub async fn list_regions(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let registrations = state.service.registrations().list().await?;
    Ok(success(registrations))
}

/// 注册或覆盖区域绑定
pub async fn register_region(
    State(state): State<AppState>,
    Path(region_id): Path<String>,
    Json(request): Json<RegisterRegionRequest>,
) -> ApiResult<impl IntoResponse> {
    let center = Coordinates::new(request.latitude, request.longitude)?;
    let mut region = GeofenceRegion::new(
        region_id,
        center,
        request.radius_meters,
        request.transitions,
    )?;
    if let Some(delay) = request.loitering_delay_ms {
        region = region.with_loitering_delay(delay);
    }

    let registration = state
        .service
        .registrations()
        .register(&region, &request.handler_id)
        .await?;
    Ok(success(registration))
}

pub async fn unregister_region(
    State(state): State<AppState>,
    Path(region_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if state.service.registrations().unregister(&region_id).await? {
        Ok(success(json!({ "region_id": region_id, "removed": true })))
    } else {
        Err(ApiError::NotFound(format!("区域 {region_id} 未注册")))
    }
}
