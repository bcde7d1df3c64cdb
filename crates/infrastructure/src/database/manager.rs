use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use geofence_core::{config::DatabaseConfig, GeofenceError, GeofenceResult};
use geofence_domain::{DeadLetterObserver, RetryPolicy};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::schema::SCHEMA_STATEMENTS;
use super::sqlite::{SqliteEventQueue, SqliteRegistrationStore};

/// SQLite 连接池与存储工厂
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> GeofenceResult<Self> {
        let mut options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| GeofenceError::config_error(format!("无效的数据库URL {}: {e}", config.url)))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(config.connection_timeout_seconds));

        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds));

        if config.is_in_memory() {
            // 内存库随最后一个连接关闭而消失
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            // 已提交的数据在进程崩溃后必须仍然存在
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Full);
            pool_options = pool_options.max_connections(config.max_connections);
        }

        let pool = pool_options.connect_with(options).await?;
        info!("数据库连接已建立: {}", config.url);

        Ok(Self { pool })
    }

    /// 使用已有连接池创建
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> GeofenceResult<()> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("数据库表结构已就绪");
        Ok(())
    }

    pub async fn health_check(&self) -> GeofenceResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn registration_store(&self) -> SqliteRegistrationStore {
        SqliteRegistrationStore::new(self.pool.clone())
    }

    pub fn event_queue(
        &self,
        retry_policy: RetryPolicy,
        dead_letter_observer: Option<Arc<dyn DeadLetterObserver>>,
    ) -> SqliteEventQueue {
        let queue = SqliteEventQueue::new(self.pool.clone(), retry_policy);
        match dead_letter_observer {
            Some(observer) => queue.with_dead_letter_observer(observer),
            None => queue,
        }
    }
}
