//! 死信观察者实现

use async_trait::async_trait;
use geofence_core::GeofenceError;
use geofence_domain::{DeadLetterObserver, QueueEntry};
use tokio::sync::mpsc;
use tracing::{error, warn};

/// 以 error 级别记录死信
#[derive(Debug, Default, Clone)]
pub struct LoggingDeadLetterObserver;

#[async_trait]
impl DeadLetterObserver for LoggingDeadLetterObserver {
    async fn on_dead_letter(&self, entry: &QueueEntry, last_error: &GeofenceError) {
        error!(
            entry_id = entry.id,
            region_id = %entry.event.region_id,
            transition = %entry.event.transition,
            handler_id = %entry.handler_id,
            attempts = entry.attempts,
            error_kind = last_error.kind(),
            "事件投递失败已进入死信: {}",
            last_error
        );
    }
}

/// 转发给嵌入方的死信记录
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub entry: QueueEntry,
    pub error: GeofenceError,
}

/// 将死信转发到 mpsc 通道
#[derive(Debug, Clone)]
pub struct ChannelDeadLetterObserver {
    sender: mpsc::UnboundedSender<DeadLetter>,
}

impl ChannelDeadLetterObserver {
    pub fn new(sender: mpsc::UnboundedSender<DeadLetter>) -> Self {
        Self { sender }
    }

    /// 创建观察者及其接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DeadLetter>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl DeadLetterObserver for ChannelDeadLetterObserver {
    async fn on_dead_letter(&self, entry: &QueueEntry, last_error: &GeofenceError) {
        let record = DeadLetter {
            entry: entry.clone(),
            error: last_error.clone(),
        };
        if self.sender.send(record).is_err() {
            warn!("死信接收端已关闭, 条目 {} 未转发", entry.id);
        }
    }
}
