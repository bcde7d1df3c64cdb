//! 处理器与死信观察者抽象
//!
//! 应用层通过实现 [`EventHandler`] 接收分发的围栏事件，
//! 通过实现 [`DeadLetterObserver`] 获知永久投递失败的事件。

use async_trait::async_trait;
use geofence_core::GeofenceError;
use thiserror::Error;

use crate::entities::{QueueEntry, TransitionEvent};

/// 处理器报告的失败
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerFailure {
    pub message: String,
    /// 永久失败不再重试，直接进入死信
    pub permanent: bool,
}

impl HandlerFailure {
    pub fn retryable<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            permanent: false,
        }
    }

    pub fn permanent<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            permanent: true,
        }
    }

    pub fn into_error(self, handler_id: &str) -> GeofenceError {
        GeofenceError::HandlerError {
            handler_id: handler_id.to_string(),
            message: self.message,
            permanent: self.permanent,
        }
    }
}

/// 应用层事件处理器
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &TransitionEvent) -> Result<(), HandlerFailure>;
}

/// 死信观察者，每个进入死信的条目恰好通知一次
#[async_trait]
pub trait DeadLetterObserver: Send + Sync {
    async fn on_dead_letter(&self, entry: &QueueEntry, last_error: &GeofenceError);
}
