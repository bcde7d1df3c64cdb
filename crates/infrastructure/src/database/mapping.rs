//! Shared database mapping utilities
//!
//! 时间统一以毫秒时间戳存储，便于在 SQL 中直接比较

use chrono::{DateTime, Utc};
use geofence_core::{GeofenceError, GeofenceResult};
use sqlx::Row;

/// Helper functions for converting between rows and domain values
pub struct MappingHelpers;

impl MappingHelpers {
    pub fn to_millis(time: DateTime<Utc>) -> i64 {
        time.timestamp_millis()
    }

    pub fn from_millis(millis: i64) -> GeofenceResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| GeofenceError::Serialization(format!("无效的时间戳: {millis}")))
    }

    pub fn get_time(row: &sqlx::sqlite::SqliteRow, field_name: &str) -> GeofenceResult<DateTime<Utc>> {
        let millis: i64 = row.try_get(field_name)?;
        Self::from_millis(millis)
    }

    pub fn get_u32(row: &sqlx::sqlite::SqliteRow, field_name: &str) -> GeofenceResult<u32> {
        let value: i64 = row.try_get(field_name)?;
        u32::try_from(value)
            .map_err(|_| GeofenceError::Serialization(format!("字段 {field_name} 超出范围: {value}")))
    }
}
