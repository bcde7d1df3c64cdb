use async_trait::async_trait;
use chrono::Utc;
use geofence_core::{GeofenceError, GeofenceResult};
use geofence_domain::{Coordinates, GeofenceRegion, Registration, RegistrationStore};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::database::mapping::MappingHelpers;

const SELECT_COLUMNS: &str = "region_id, latitude, longitude, radius_meters, transitions, loitering_delay_ms, handler_id, registered_at_ms, updated_at_ms";

pub struct SqliteRegistrationStore {
    pool: SqlitePool,
}

impl SqliteRegistrationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_registration(row: &sqlx::sqlite::SqliteRow) -> GeofenceResult<Registration> {
        let transitions_column: String = row.try_get("transitions")?;
        let loitering_delay_ms: Option<i64> = row.try_get("loitering_delay_ms")?;

        // 行数据在写入时已校验，这里按原样还原
        let region = GeofenceRegion {
            id: row.try_get("region_id")?,
            center: Coordinates {
                latitude: row.try_get("latitude")?,
                longitude: row.try_get("longitude")?,
            },
            radius_meters: row.try_get("radius_meters")?,
            transitions: GeofenceRegion::parse_transitions_column(&transitions_column)?,
            loitering_delay_ms: loitering_delay_ms.and_then(|v| u32::try_from(v).ok()),
        };

        Ok(Registration {
            region,
            handler_id: row.try_get("handler_id")?,
            registered_at: MappingHelpers::get_time(row, "registered_at_ms")?,
            updated_at: MappingHelpers::get_time(row, "updated_at_ms")?,
        })
    }
}

#[async_trait]
impl RegistrationStore for SqliteRegistrationStore {
    async fn register(
        &self,
        region: &GeofenceRegion,
        handler_id: &str,
    ) -> GeofenceResult<Registration> {
        if handler_id.trim().is_empty() {
            return Err(GeofenceError::InvalidRegistration(format!(
                "区域 {} 的处理器ID不能为空",
                region.id
            )));
        }

        let now_ms = MappingHelpers::to_millis(Utc::now());

        // 仅用于覆盖日志；写入本身是单条语句，不在读事务中升级为写锁
        let previous: Option<String> =
            sqlx::query_scalar("SELECT handler_id FROM registrations WHERE region_id = $1")
                .bind(&region.id)
                .fetch_optional(&self.pool)
                .await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO registrations (region_id, latitude, longitude, radius_meters, transitions, loitering_delay_ms, handler_id, registered_at_ms, updated_at_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            ON CONFLICT(region_id) DO UPDATE SET
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                radius_meters = excluded.radius_meters,
                transitions = excluded.transitions,
                loitering_delay_ms = excluded.loitering_delay_ms,
                handler_id = excluded.handler_id,
                updated_at_ms = excluded.updated_at_ms
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(&region.id)
        .bind(region.center.latitude)
        .bind(region.center.longitude)
        .bind(region.radius_meters)
        .bind(region.transitions_column())
        .bind(region.loitering_delay_ms.map(i64::from))
        .bind(handler_id)
        .bind(now_ms)
        .fetch_one(&self.pool)
        .await?;
        let registration = Self::row_to_registration(&row)?;

        match previous {
            Some(old_handler) if old_handler != handler_id => {
                warn!(
                    "区域 {} 的注册被覆盖, 处理器: {} -> {}",
                    region.id, old_handler, handler_id
                );
            }
            Some(_) => debug!("更新区域注册: {}", region.id),
            None => info!("注册区域成功: {} -> {}", region.id, handler_id),
        }

        Ok(registration)
    }

    async fn unregister(&self, region_id: &str) -> GeofenceResult<bool> {
        let result = sqlx::query("DELETE FROM registrations WHERE region_id = $1")
            .bind(region_id)
            .execute(&self.pool)
            .await?;

        let existed = result.rows_affected() > 0;
        if existed {
            info!("注销区域成功: {}", region_id);
        } else {
            debug!("注销区域时未找到注册: {}", region_id);
        }
        Ok(existed)
    }

    async fn resolve(&self, region_id: &str) -> GeofenceResult<Registration> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM registrations WHERE region_id = $1"
        ))
        .bind(region_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_registration(&row),
            None => Err(GeofenceError::unresolved_region(region_id)),
        }
    }

    async fn list(&self) -> GeofenceResult<Vec<Registration>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM registrations ORDER BY region_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_registration).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use geofence_core::config::DatabaseConfig;
    use geofence_domain::TransitionType;

    async fn setup_store() -> SqliteRegistrationStore {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        };
        let db = DatabaseManager::new(&config).await.unwrap();
        db.migrate().await.unwrap();
        db.registration_store()
    }

    fn region(id: &str, transitions: &[TransitionType]) -> GeofenceRegion {
        GeofenceRegion::new(
            id,
            Coordinates::new(48.8584, 2.2945).unwrap(),
            200.0,
            transitions.iter().copied(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let store = setup_store().await;
        let r1 = region("R1", &[TransitionType::Enter, TransitionType::Exit]).with_loitering_delay(30_000);

        let registration = store.register(&r1, "H1").await.unwrap();
        assert_eq!(registration.handler_id, "H1");
        assert_eq!(registration.region, r1);

        let resolved = store.resolve("R1").await.unwrap();
        assert_eq!(resolved.region, r1);
        assert_eq!(resolved.handler_id, "H1");
        assert_eq!(resolved.region.loitering_delay_ms, Some(30_000));
    }

    #[tokio::test]
    async fn test_resolve_unknown_region() {
        let store = setup_store().await;
        let err = store.resolve("missing").await.unwrap_err();
        assert_eq!(err, GeofenceError::unresolved_region("missing"));
    }

    #[tokio::test]
    async fn test_register_overrides_binding() {
        let store = setup_store().await;
        let first = store.register(&region("R1", &[TransitionType::Enter]), "H1").await.unwrap();
        let second = store
            .register(&region("R1", &[TransitionType::Exit]), "H2")
            .await
            .unwrap();

        assert_eq!(second.handler_id, "H2");
        assert_eq!(second.region.transitions, vec![TransitionType::Exit]);
        assert_eq!(second.registered_at, first.registered_at);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_handler_id_is_rejected() {
        let store = setup_store().await;
        let result = store.register(&region("R1", &[TransitionType::Enter]), "  ").await;
        assert!(matches!(result, Err(GeofenceError::InvalidRegistration(_))));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unregister_and_list_order() {
        let store = setup_store().await;
        store.register(&region("R2", &[TransitionType::Dwell]), "H1").await.unwrap();
        store.register(&region("R1", &[TransitionType::Enter]), "H1").await.unwrap();

        let ids: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.region.id)
            .collect();
        assert_eq!(ids, vec!["R1".to_string(), "R2".to_string()]);

        assert!(store.unregister("R1").await.unwrap());
        assert!(!store.unregister("R1").await.unwrap());
        assert!(store.resolve("R1").await.is_err());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
