use thiserror::Error;

/// 地理围栏分发错误类型定义
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeofenceError {
    #[error("未注册的围栏区域: {region_id}")]
    UnresolvedRegion { region_id: String },

    #[error("处理器执行超时: {handler_id} ({timeout_ms}ms)")]
    HandlerTimeout { handler_id: String, timeout_ms: u64 },

    #[error("处理器执行失败: {handler_id} - {message}")]
    HandlerError {
        handler_id: String,
        message: String,
        permanent: bool,
    },

    #[error("处理器未找到: {handler_id}")]
    HandlerNotFound { handler_id: String },

    #[error("持久化失败: {0}")]
    Persistence(String),

    #[error("队列条目未找到: {id}")]
    EntryNotFound { id: i64 },

    #[error("队列条目 {id} 状态不允许该操作: {status}")]
    InvalidEntryState { id: i64, status: String },

    #[error("去重键已存在活动条目: {dedup_key}")]
    DuplicateActiveEntry { dedup_key: String },

    #[error("无效的围栏区域: {0}")]
    InvalidRegion(String),

    #[error("无效的注册信息: {0}")]
    InvalidRegistration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("服务已在运行: {0}")]
    AlreadyRunning(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl GeofenceError {
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn unresolved_region<S: Into<String>>(region_id: S) -> Self {
        Self::UnresolvedRegion {
            region_id: region_id.into(),
        }
    }

    pub fn handler_not_found<S: Into<String>>(handler_id: S) -> Self {
        Self::HandlerNotFound {
            handler_id: handler_id.into(),
        }
    }

    pub fn invalid_region<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRegion(msg.into())
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// 投递失败后是否应当放弃重试，直接进入死信
    pub fn is_permanent(&self) -> bool {
        matches!(self, GeofenceError::HandlerError { permanent: true, .. })
    }

    /// 投递失败后是否可以按退避策略重试
    pub fn is_retryable(&self) -> bool {
        match self {
            GeofenceError::HandlerTimeout { .. }
            | GeofenceError::HandlerNotFound { .. }
            | GeofenceError::Persistence(_) => true,
            GeofenceError::HandlerError { permanent, .. } => !permanent,
            _ => false,
        }
    }

    /// 便于日志和指标使用的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            GeofenceError::UnresolvedRegion { .. } => "unresolved_region",
            GeofenceError::HandlerTimeout { .. } => "handler_timeout",
            GeofenceError::HandlerError { .. } => "handler_error",
            GeofenceError::HandlerNotFound { .. } => "handler_not_found",
            GeofenceError::Persistence(_) => "persistence",
            GeofenceError::EntryNotFound { .. } => "entry_not_found",
            GeofenceError::InvalidEntryState { .. } => "invalid_entry_state",
            GeofenceError::DuplicateActiveEntry { .. } => "duplicate_active_entry",
            GeofenceError::InvalidRegion(_) => "invalid_region",
            GeofenceError::InvalidRegistration(_) => "invalid_registration",
            GeofenceError::Serialization(_) => "serialization",
            GeofenceError::Configuration(_) => "configuration",
            GeofenceError::AlreadyRunning(_) => "already_running",
            GeofenceError::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for GeofenceError {
    fn from(err: sqlx::Error) -> Self {
        GeofenceError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for GeofenceError {
    fn from(err: serde_json::Error) -> Self {
        GeofenceError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for GeofenceError {
    fn from(err: anyhow::Error) -> Self {
        GeofenceError::Internal(err.to_string())
    }
}
