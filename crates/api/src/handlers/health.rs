use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::routes::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database_ok = state.service.database().health_check().await.is_ok();
    let running = state.service.is_running().await;
    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database_ok { "ok" } else { "degraded" },
            "database": database_ok,
            "dispatcher_running": running,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "service": "geofence-dispatch",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
