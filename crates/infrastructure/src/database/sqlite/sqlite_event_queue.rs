use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use geofence_core::{GeofenceError, GeofenceResult};
use geofence_domain::{
    DeadLetterObserver, EntryStatus, EventQueue, FailureOutcome, QueueEntry, QueueStats,
    RetryPolicy, TransitionEvent, TransitionType,
};
use sqlx::{Row, SqlitePool};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};

use crate::database::mapping::MappingHelpers;

const SELECT_COLUMNS: &str = "id, dedup_key, region_id, transition, event_timestamp_ms, handler_id, status, attempts, next_retry_at_ms, last_error, enqueued_at_ms, updated_at_ms";

/// 基于 SQLite 的持久化事件队列
///
/// 所有写操作都在 `write_lock` 内完成，配合 SQLite 单写事务保证线性一致。
/// 死信观察者在释放锁之后调用，每个条目只通知一次。
pub struct SqliteEventQueue {
    pool: SqlitePool,
    retry_policy: RetryPolicy,
    dead_letter_observer: Option<Arc<dyn DeadLetterObserver>>,
    work_notifier: Option<Arc<Notify>>,
    write_lock: Mutex<()>,
}

impl SqliteEventQueue {
    pub fn new(pool: SqlitePool, retry_policy: RetryPolicy) -> Self {
        Self {
            pool,
            retry_policy,
            dead_letter_observer: None,
            work_notifier: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_dead_letter_observer(mut self, observer: Arc<dyn DeadLetterObserver>) -> Self {
        self.dead_letter_observer = Some(observer);
        self
    }

    /// 新条目入队或恢复时唤醒等待中的消费者
    pub fn with_work_notifier(mut self, notifier: Arc<Notify>) -> Self {
        self.work_notifier = Some(notifier);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    fn notify_work(&self) {
        if let Some(notifier) = &self.work_notifier {
            notifier.notify_one();
        }
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> GeofenceResult<QueueEntry> {
        let transition: TransitionType = row.try_get("transition")?;
        let status: EntryStatus = row.try_get("status")?;

        Ok(QueueEntry {
            id: row.try_get("id")?,
            event: TransitionEvent {
                region_id: row.try_get("region_id")?,
                transition,
                timestamp_ms: row.try_get("event_timestamp_ms")?,
                dedup_key: row.try_get("dedup_key")?,
            },
            handler_id: row.try_get("handler_id")?,
            status,
            attempts: MappingHelpers::get_u32(row, "attempts")?,
            next_retry_at: MappingHelpers::get_time(row, "next_retry_at_ms")?,
            last_error: row.try_get("last_error")?,
            enqueued_at: MappingHelpers::get_time(row, "enqueued_at_ms")?,
            updated_at: MappingHelpers::get_time(row, "updated_at_ms")?,
        })
    }

    async fn fetch_entry(&self, entry_id: i64) -> GeofenceResult<Option<QueueEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM queue_entries WHERE id = $1"
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn fetch_active_by_key(&self, dedup_key: &str) -> GeofenceResult<Option<QueueEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM queue_entries WHERE dedup_key = $1 AND status IN ($2, $3)"
        ))
        .bind(dedup_key)
        .bind(EntryStatus::Pending)
        .bind(EntryStatus::InFlight)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn notify_dead_letter(&self, entry: &QueueEntry, last_error: &GeofenceError) {
        match &self.dead_letter_observer {
            Some(observer) => observer.on_dead_letter(entry, last_error).await,
            None => error!(
                "{} 已进入死信 (失败次数: {}): {}",
                entry.entity_description(),
                entry.attempts,
                last_error
            ),
        }
    }
}

#[async_trait]
impl EventQueue for SqliteEventQueue {
    async fn enqueue(
        &self,
        event: &TransitionEvent,
        handler_id: &str,
    ) -> GeofenceResult<QueueEntry> {
        let _guard = self.write_lock.lock().await;
        let now_ms = MappingHelpers::to_millis(Utc::now());

        // 活动条目上的部分唯一索引使重复键的插入被忽略
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO queue_entries (dedup_key, region_id, transition, event_timestamp_ms, handler_id, status, attempts, next_retry_at_ms, last_error, enqueued_at_ms, updated_at_ms)
            VALUES ($1, $2, $3, $4, $5, $6, 0, $7, NULL, $7, $7)
            "#,
        )
        .bind(&event.dedup_key)
        .bind(&event.region_id)
        .bind(event.transition)
        .bind(event.timestamp_ms)
        .bind(handler_id)
        .bind(EntryStatus::Pending)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let existing = self.fetch_active_by_key(&event.dedup_key).await?.ok_or_else(|| {
                GeofenceError::persistence(format!("去重键 {} 的活动条目不存在", event.dedup_key))
            })?;
            debug!(
                "重复事件已折叠: {} -> 已有条目 {}",
                event.dedup_key, existing.id
            );
            return Ok(existing);
        }

        let entry = self
            .fetch_entry(result.last_insert_rowid())
            .await?
            .ok_or(GeofenceError::EntryNotFound {
                id: result.last_insert_rowid(),
            })?;
        drop(_guard);

        debug!("事件已入队: {}", entry.entity_description());
        self.notify_work();
        Ok(entry)
    }

    async fn dequeue_batch(&self, max_count: usize) -> GeofenceResult<Vec<QueueEntry>> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let _guard = self.write_lock.lock().await;
        let now_ms = MappingHelpers::to_millis(Utc::now());
        let limit = i64::try_from(max_count).unwrap_or(i64::MAX);

        let rows = sqlx::query(&format!(
            r#"
            UPDATE queue_entries SET status = $1, updated_at_ms = $2
            WHERE id IN (
                SELECT id FROM queue_entries
                WHERE status = $3 AND next_retry_at_ms <= $2
                ORDER BY enqueued_at_ms, id
                LIMIT $4
            )
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(EntryStatus::InFlight)
        .bind(now_ms)
        .bind(EntryStatus::Pending)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        // RETURNING 不保证顺序
        let mut entries = rows
            .iter()
            .map(Self::row_to_entry)
            .collect::<GeofenceResult<Vec<_>>>()?;
        entries.sort_by(|a, b| a.enqueued_at.cmp(&b.enqueued_at).then(a.id.cmp(&b.id)));

        if !entries.is_empty() {
            debug!("取出 {} 个待投递条目", entries.len());
        }
        Ok(entries)
    }

    async fn mark_delivered(&self, entry_id: i64) -> GeofenceResult<()> {
        let _guard = self.write_lock.lock().await;
        let entry = self
            .fetch_entry(entry_id)
            .await?
            .ok_or(GeofenceError::EntryNotFound { id: entry_id })?;

        if entry.is_terminal() {
            debug!("条目 {} 已处于终态 {}, 忽略投递确认", entry_id, entry.status);
            return Ok(());
        }

        sqlx::query("UPDATE queue_entries SET status = $1, updated_at_ms = $2 WHERE id = $3")
            .bind(EntryStatus::Delivered)
            .bind(MappingHelpers::to_millis(Utc::now()))
            .bind(entry_id)
            .execute(&self.pool)
            .await?;

        debug!("{} 投递成功", entry.entity_description());
        Ok(())
    }

    async fn mark_failed(
        &self,
        entry_id: i64,
        error: &GeofenceError,
    ) -> GeofenceResult<FailureOutcome> {
        let guard = self.write_lock.lock().await;
        let entry = self
            .fetch_entry(entry_id)
            .await?
            .ok_or(GeofenceError::EntryNotFound { id: entry_id })?;

        if entry.is_terminal() {
            debug!("条目 {} 已处于终态 {}, 忽略失败记录", entry_id, entry.status);
            return Ok(FailureOutcome::AlreadyTerminal(entry.status));
        }

        let attempts = entry.attempts.saturating_add(1);
        let now = Utc::now();
        let dead = error.is_permanent() || self.retry_policy.is_exhausted(attempts);

        let (status, next_retry_at) = if dead {
            (EntryStatus::Dead, now)
        } else {
            let backoff = self.retry_policy.next_backoff(attempts);
            let backoff = ChronoDuration::from_std(backoff)
                .map_err(|e| GeofenceError::Internal(format!("退避时间溢出: {e}")))?;
            (EntryStatus::Pending, now + backoff)
        };

        sqlx::query(
            r#"
            UPDATE queue_entries
            SET status = $1, attempts = $2, next_retry_at_ms = $3, last_error = $4, updated_at_ms = $5
            WHERE id = $6
            "#,
        )
        .bind(status)
        .bind(i64::from(attempts))
        .bind(MappingHelpers::to_millis(next_retry_at))
        .bind(error.to_string())
        .bind(MappingHelpers::to_millis(now))
        .bind(entry_id)
        .execute(&self.pool)
        .await?;
        drop(guard);

        if dead {
            let dead_entry = QueueEntry {
                status,
                attempts,
                next_retry_at,
                last_error: Some(error.to_string()),
                updated_at: now,
                ..entry
            };
            self.notify_dead_letter(&dead_entry, error).await;
            return Ok(FailureOutcome::DeadLettered { attempts });
        }

        warn!(
            "{} 投递失败 (第 {} 次), 将于 {} 重试: {}",
            entry.entity_description(),
            attempts,
            next_retry_at,
            error
        );
        Ok(FailureOutcome::Retrying {
            attempts,
            next_retry_at,
        })
    }

    async fn get(&self, entry_id: i64) -> GeofenceResult<Option<QueueEntry>> {
        self.fetch_entry(entry_id).await
    }

    async fn recover_in_flight(&self) -> GeofenceResult<u64> {
        let _guard = self.write_lock.lock().await;
        let now_ms = MappingHelpers::to_millis(Utc::now());

        let result = sqlx::query(
            "UPDATE queue_entries SET status = $1, next_retry_at_ms = $2, updated_at_ms = $2 WHERE status = $3",
        )
        .bind(EntryStatus::Pending)
        .bind(now_ms)
        .bind(EntryStatus::InFlight)
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            info!("已恢复 {} 个中断的投递中条目", recovered);
            self.notify_work();
        }
        Ok(recovered)
    }

    async fn purge_delivered(&self, older_than: DateTime<Utc>) -> GeofenceResult<u64> {
        let _guard = self.write_lock.lock().await;
        let result =
            sqlx::query("DELETE FROM queue_entries WHERE status = $1 AND updated_at_ms < $2")
                .bind(EntryStatus::Delivered)
                .bind(MappingHelpers::to_millis(older_than))
                .execute(&self.pool)
                .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            debug!("清理了 {} 个已投递条目", purged);
        }
        Ok(purged)
    }

    async fn list_dead_letters(&self, limit: usize) -> GeofenceResult<Vec<QueueEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM queue_entries WHERE status = $1 ORDER BY updated_at_ms DESC, id DESC LIMIT $2"
        ))
        .bind(EntryStatus::Dead)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn requeue_dead(&self, entry_id: i64) -> GeofenceResult<QueueEntry> {
        let guard = self.write_lock.lock().await;
        let entry = self
            .fetch_entry(entry_id)
            .await?
            .ok_or(GeofenceError::EntryNotFound { id: entry_id })?;

        if entry.status != EntryStatus::Dead {
            return Err(GeofenceError::InvalidEntryState {
                id: entry_id,
                status: entry.status.to_string(),
            });
        }
        if self.fetch_active_by_key(&entry.event.dedup_key).await?.is_some() {
            return Err(GeofenceError::DuplicateActiveEntry {
                dedup_key: entry.event.dedup_key,
            });
        }

        let now_ms = MappingHelpers::to_millis(Utc::now());
        sqlx::query(
            "UPDATE queue_entries SET status = $1, attempts = 0, next_retry_at_ms = $2, updated_at_ms = $2 WHERE id = $3",
        )
        .bind(EntryStatus::Pending)
        .bind(now_ms)
        .bind(entry_id)
        .execute(&self.pool)
        .await?;

        let requeued = self
            .fetch_entry(entry_id)
            .await?
            .ok_or(GeofenceError::EntryNotFound { id: entry_id })?;
        drop(guard);

        info!("死信条目已重新入队: {}", requeued.entity_description());
        self.notify_work();
        Ok(requeued)
    }

    async fn stats(&self) -> GeofenceResult<QueueStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) as count FROM queue_entries GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: EntryStatus = row.try_get("status")?;
            let count = u64::try_from(row.try_get::<i64, _>("count")?).unwrap_or_default();
            match status {
                EntryStatus::Pending => stats.pending = count,
                EntryStatus::InFlight => stats.in_flight = count,
                EntryStatus::Delivered => stats.delivered = count,
                EntryStatus::Dead => stats.dead = count,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use geofence_core::config::DatabaseConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingObserver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DeadLetterObserver for CountingObserver {
        async fn on_dead_letter(&self, entry: &QueueEntry, _last_error: &GeofenceError) {
            assert_eq!(entry.status, EntryStatus::Dead);
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn setup_db() -> DatabaseManager {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        };
        let db = DatabaseManager::new(&config).await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    fn immediate_retry_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            ..RetryPolicy::default()
        }
    }

    fn event(region: &str, timestamp_ms: i64) -> TransitionEvent {
        TransitionEvent::new(region, TransitionType::Enter, timestamp_ms, 60_000)
    }

    fn transient_error() -> GeofenceError {
        GeofenceError::HandlerError {
            handler_id: "H1".to_string(),
            message: "temporarily unavailable".to_string(),
            permanent: false,
        }
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_on_dedup_key() {
        let db = setup_db().await;
        let queue = db.event_queue(RetryPolicy::default(), None);

        let first = queue.enqueue(&event("R1", 100), "H1").await.unwrap();
        let second = queue.enqueue(&event("R1", 30_000), "H1").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.status, EntryStatus::Pending);
        assert_eq!(queue.stats().await.unwrap().pending, 1);

        // 投递中仍视为活动条目
        let batch = queue.dequeue_batch(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        let third = queue.enqueue(&event("R1", 100), "H1").await.unwrap();
        assert_eq!(third.id, first.id);
        assert_eq!(third.status, EntryStatus::InFlight);
    }

    #[tokio::test]
    async fn test_same_key_after_delivery_creates_new_entry() {
        let db = setup_db().await;
        let queue = db.event_queue(RetryPolicy::default(), None);

        let first = queue.enqueue(&event("R1", 100), "H1").await.unwrap();
        queue.dequeue_batch(1).await.unwrap();
        queue.mark_delivered(first.id).await.unwrap();

        let second = queue.enqueue(&event("R1", 100), "H1").await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.status, EntryStatus::Pending);
    }

    #[tokio::test]
    async fn test_dequeue_preserves_arrival_order() {
        let db = setup_db().await;
        let queue = db.event_queue(RetryPolicy::default(), None);

        let mut ids = Vec::new();
        for (i, region) in ["R3", "R1", "R2", "R5", "R4"].iter().enumerate() {
            let entry = queue.enqueue(&event(region, i as i64), "H1").await.unwrap();
            ids.push(entry.id);
        }

        let first = queue.dequeue_batch(2).await.unwrap();
        let rest = queue.dequeue_batch(10).await.unwrap();
        let dequeued: Vec<i64> = first.iter().chain(rest.iter()).map(|e| e.id).collect();

        assert_eq!(dequeued, ids);
        assert!(first.iter().all(|e| e.status == EntryStatus::InFlight));
        assert!(queue.dequeue_batch(10).await.unwrap().is_empty());
        assert!(queue.dequeue_batch(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_entry_waits_for_backoff() {
        let db = setup_db().await;
        let queue = db.event_queue(RetryPolicy::default(), None);

        let entry = queue.enqueue(&event("R1", 100), "H1").await.unwrap();
        queue.dequeue_batch(1).await.unwrap();

        let before = Utc::now();
        let outcome = queue.mark_failed(entry.id, &transient_error()).await.unwrap();
        let (attempts, next_retry_at) = match outcome {
            FailureOutcome::Retrying {
                attempts,
                next_retry_at,
            } => (attempts, next_retry_at),
            other => panic!("expected retry, got {other:?}"),
        };

        assert_eq!(attempts, 1);
        let delay = next_retry_at - before;
        assert!(delay >= ChronoDuration::milliseconds(790));
        assert!(delay <= ChronoDuration::milliseconds(1_300));

        // 退避期间不会被再次取出
        assert!(queue.dequeue_batch(10).await.unwrap().is_empty());

        let stored = queue.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EntryStatus::Pending);
        assert_eq!(stored.attempts, 1);
        assert!(stored.last_error.unwrap().contains("temporarily unavailable"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter_exactly_once() {
        let db = setup_db().await;
        let observer = Arc::new(CountingObserver::default());
        let queue = db.event_queue(immediate_retry_policy(2), Some(observer.clone()));

        let entry = queue.enqueue(&event("R1", 100), "H1").await.unwrap();
        for expected in 1..=2 {
            let batch = queue.dequeue_batch(1).await.unwrap();
            assert_eq!(batch.len(), 1);
            let outcome = queue.mark_failed(entry.id, &transient_error()).await.unwrap();
            assert!(matches!(outcome, FailureOutcome::Retrying { attempts, .. } if attempts == expected));
        }

        queue.dequeue_batch(1).await.unwrap();
        let outcome = queue.mark_failed(entry.id, &transient_error()).await.unwrap();
        assert_eq!(outcome, FailureOutcome::DeadLettered { attempts: 3 });

        let again = queue.mark_failed(entry.id, &transient_error()).await.unwrap();
        assert_eq!(again, FailureOutcome::AlreadyTerminal(EntryStatus::Dead));
        assert_eq!(observer.calls.load(Ordering::SeqCst), 1);

        let dead = queue.list_dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 3);
        assert!(queue.dequeue_batch(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_failure_dead_letters_immediately() {
        let db = setup_db().await;
        let observer = Arc::new(CountingObserver::default());
        let queue = db.event_queue(RetryPolicy::default(), Some(observer.clone()));

        let entry = queue.enqueue(&event("R1", 100), "H1").await.unwrap();
        queue.dequeue_batch(1).await.unwrap();

        let error = GeofenceError::HandlerError {
            handler_id: "H1".to_string(),
            message: "rejected".to_string(),
            permanent: true,
        };
        let outcome = queue.mark_failed(entry.id, &error).await.unwrap();
        assert_eq!(outcome, FailureOutcome::DeadLettered { attempts: 1 });
        assert_eq!(observer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mark_delivered_is_idempotent() {
        let db = setup_db().await;
        let queue = db.event_queue(RetryPolicy::default(), None);

        let entry = queue.enqueue(&event("R1", 100), "H1").await.unwrap();
        queue.dequeue_batch(1).await.unwrap();
        queue.mark_delivered(entry.id).await.unwrap();
        queue.mark_delivered(entry.id).await.unwrap();

        let stored = queue.get(entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EntryStatus::Delivered);

        let err = queue.mark_delivered(9_999).await.unwrap_err();
        assert_eq!(err, GeofenceError::EntryNotFound { id: 9_999 });
    }

    #[tokio::test]
    async fn test_recover_in_flight() {
        let db = setup_db().await;
        let queue = db.event_queue(RetryPolicy::default(), None);

        let a = queue.enqueue(&event("R1", 100), "H1").await.unwrap();
        let b = queue.enqueue(&event("R2", 100), "H1").await.unwrap();
        queue.dequeue_batch(1).await.unwrap();

        assert_eq!(queue.recover_in_flight().await.unwrap(), 1);
        assert_eq!(queue.recover_in_flight().await.unwrap(), 0);

        let batch = queue.dequeue_batch(10).await.unwrap();
        let ids: Vec<i64> = batch.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_requeue_dead_letter() {
        let db = setup_db().await;
        let queue = db.event_queue(immediate_retry_policy(0), None);

        let entry = queue.enqueue(&event("R1", 100), "H1").await.unwrap();
        queue.dequeue_batch(1).await.unwrap();
        queue.mark_failed(entry.id, &transient_error()).await.unwrap();

        // 同一去重键已有新的活动条目时拒绝重新入队
        let replacement = queue.enqueue(&event("R1", 100), "H1").await.unwrap();
        let err = queue.requeue_dead(entry.id).await.unwrap_err();
        assert!(matches!(err, GeofenceError::DuplicateActiveEntry { .. }));

        queue.dequeue_batch(1).await.unwrap();
        queue.mark_delivered(replacement.id).await.unwrap();

        let requeued = queue.requeue_dead(entry.id).await.unwrap();
        assert_eq!(requeued.status, EntryStatus::Pending);
        assert_eq!(requeued.attempts, 0);

        let err = queue.requeue_dead(entry.id).await.unwrap_err();
        assert!(matches!(err, GeofenceError::InvalidEntryState { .. }));
    }

    #[tokio::test]
    async fn test_purge_delivered_and_stats() {
        let db = setup_db().await;
        let queue = db.event_queue(RetryPolicy::default(), None);

        let delivered = queue.enqueue(&event("R1", 100), "H1").await.unwrap();
        queue.enqueue(&event("R2", 100), "H1").await.unwrap();
        queue.dequeue_batch(1).await.unwrap();
        queue.mark_delivered(delivered.id).await.unwrap();

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.active(), 1);

        assert_eq!(
            queue
                .purge_delivered(Utc::now() - ChronoDuration::hours(1))
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            queue
                .purge_delivered(Utc::now() + ChronoDuration::seconds(1))
                .await
                .unwrap(),
            1
        );
        assert!(queue.get(delivered.id).await.unwrap().is_none());
        assert_eq!(queue.stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_enqueue_signals_work_notifier() {
        let db = setup_db().await;
        let notifier = Arc::new(Notify::new());
        let queue = db
            .event_queue(RetryPolicy::default(), None)
            .with_work_notifier(notifier.clone());

        queue.enqueue(&event("R1", 100), "H1").await.unwrap();
        tokio::time::timeout(Duration::from_millis(100), notifier.notified())
            .await
            .expect("enqueue should wake the consumer");
    }
}
