//! 数据库表结构
//!
//! 所有语句均可重复执行，启动时按顺序应用

pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS registrations (
        region_id TEXT PRIMARY KEY,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        radius_meters REAL NOT NULL,
        transitions TEXT NOT NULL,
        loitering_delay_ms INTEGER,
        handler_id TEXT NOT NULL,
        registered_at_ms INTEGER NOT NULL,
        updated_at_ms INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS queue_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        dedup_key TEXT NOT NULL,
        region_id TEXT NOT NULL,
        transition TEXT NOT NULL,
        event_timestamp_ms INTEGER NOT NULL,
        handler_id TEXT NOT NULL,
        status TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        next_retry_at_ms INTEGER NOT NULL,
        last_error TEXT,
        enqueued_at_ms INTEGER NOT NULL,
        updated_at_ms INTEGER NOT NULL
    )
    "#,
    // 同一去重键最多只有一个活动条目
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_entries_active_dedup
        ON queue_entries (dedup_key)
        WHERE status IN ('PENDING', 'IN_FLIGHT')
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_queue_entries_due
        ON queue_entries (status, next_retry_at_ms, enqueued_at_ms, id)
    "#,
];
