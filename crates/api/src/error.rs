use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use geofence_core::GeofenceError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("分发服务错误: {0}")]
    Geofence(#[from] GeofenceError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源: {0}")]
    NotFound(String),
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Geofence(err) => match err {
                GeofenceError::UnresolvedRegion { .. } => {
                    (StatusCode::NOT_FOUND, "UNRESOLVED_REGION")
                }
                GeofenceError::EntryNotFound { .. } => (StatusCode::NOT_FOUND, "ENTRY_NOT_FOUND"),
                GeofenceError::InvalidRegion(_) => (StatusCode::BAD_REQUEST, "INVALID_REGION"),
                GeofenceError::InvalidRegistration(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_REGISTRATION")
                }
                GeofenceError::InvalidEntryState { .. } => {
                    (StatusCode::CONFLICT, "INVALID_ENTRY_STATE")
                }
                GeofenceError::DuplicateActiveEntry { .. } => {
                    (StatusCode::CONFLICT, "DUPLICATE_ACTIVE_ENTRY")
                }
                GeofenceError::Persistence(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "PERSISTENCE_ERROR")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        if status.is_server_error() {
            tracing::error!("请求处理失败: {}", self);
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "message": self.to_string(),
                "type": error_type,
                "code": status.as_u16(),
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
