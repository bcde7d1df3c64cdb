//! 领域存储抽象
//!
//! 定义注册信息与事件队列的持久化接口，所有写操作在返回前完成持久化

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geofence_core::{GeofenceError, GeofenceResult};

use crate::entities::{
    FailureOutcome, GeofenceRegion, QueueEntry, QueueStats, Registration, TransitionEvent,
};

/// 区域注册存储
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// 新增或覆盖区域绑定（后写者胜出）
    async fn register(
        &self,
        region: &GeofenceRegion,
        handler_id: &str,
    ) -> GeofenceResult<Registration>;
    /// 删除区域绑定，返回绑定是否存在
    async fn unregister(&self, region_id: &str) -> GeofenceResult<bool>;
    /// 解析区域绑定，未注册时返回 `UnresolvedRegion`
    async fn resolve(&self, region_id: &str) -> GeofenceResult<Registration>;
    async fn list(&self) -> GeofenceResult<Vec<Registration>>;
}

/// 持久化的有序事件队列
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// 按去重键幂等入队，已有活动条目时直接返回该条目
    async fn enqueue(&self, event: &TransitionEvent, handler_id: &str)
        -> GeofenceResult<QueueEntry>;
    /// 按入队顺序取出已到期的待投递条目，并原子地标记为投递中
    async fn dequeue_batch(&self, max_count: usize) -> GeofenceResult<Vec<QueueEntry>>;
    async fn mark_delivered(&self, entry_id: i64) -> GeofenceResult<()>;
    /// 记录一次投递失败，决定重试或进入死信
    async fn mark_failed(
        &self,
        entry_id: i64,
        error: &GeofenceError,
    ) -> GeofenceResult<FailureOutcome>;
    async fn get(&self, entry_id: i64) -> GeofenceResult<Option<QueueEntry>>;
    /// 将崩溃前遗留的投递中条目恢复为待投递，返回恢复数量
    async fn recover_in_flight(&self) -> GeofenceResult<u64>;
    /// 删除早于给定时间的已投递条目，返回删除数量
    async fn purge_delivered(&self, older_than: DateTime<Utc>) -> GeofenceResult<u64>;
    async fn list_dead_letters(&self, limit: usize) -> GeofenceResult<Vec<QueueEntry>>;
    /// 将死信条目重新放回队列
    async fn requeue_dead(&self, entry_id: i64) -> GeofenceResult<QueueEntry>;
    async fn stats(&self) -> GeofenceResult<QueueStats>;
}
