use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use geofence_core::{GeofenceError, GeofenceResult};
use serde::{Deserialize, Serialize};

use crate::value_objects::Coordinates;

/// 围栏状态变化类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransitionType {
    #[serde(rename = "ENTER", alias = "enter")]
    Enter,
    #[serde(rename = "EXIT", alias = "exit")]
    Exit,
    #[serde(rename = "DWELL", alias = "dwell")]
    Dwell,
}

impl TransitionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionType::Enter => "ENTER",
            TransitionType::Exit => "EXIT",
            TransitionType::Dwell => "DWELL",
        }
    }
}

impl fmt::Display for TransitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionType {
    type Err = GeofenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ENTER" => Ok(TransitionType::Enter),
            "EXIT" => Ok(TransitionType::Exit),
            "DWELL" => Ok(TransitionType::Dwell),
            other => Err(GeofenceError::invalid_region(format!(
                "未知的状态变化类型: {other}"
            ))),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for TransitionType {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TransitionType {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<TransitionType>()
            .map_err(|e| format!("Invalid transition type: {e}").into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TransitionType {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 被监控的地理围栏区域，创建后不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeofenceRegion {
    pub id: String,
    pub center: Coordinates,
    pub radius_meters: f64,
    pub transitions: Vec<TransitionType>,
    /// 停留事件触发前需要的停留时长，由平台层使用
    pub loitering_delay_ms: Option<u32>,
}

impl GeofenceRegion {
    pub fn new(
        id: impl Into<String>,
        center: Coordinates,
        radius_meters: f64,
        transitions: impl IntoIterator<Item = TransitionType>,
    ) -> GeofenceResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(GeofenceError::invalid_region("区域ID不能为空"));
        }
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Err(GeofenceError::invalid_region(format!(
                "区域 {id} 的半径必须大于0: {radius_meters}"
            )));
        }

        let mut transitions: Vec<TransitionType> = transitions.into_iter().collect();
        transitions.sort();
        transitions.dedup();
        if transitions.is_empty() {
            return Err(GeofenceError::invalid_region(format!(
                "区域 {id} 至少需要监控一种状态变化"
            )));
        }

        Ok(Self {
            id,
            center,
            radius_meters,
            transitions,
            loitering_delay_ms: None,
        })
    }

    pub fn with_loitering_delay(mut self, loitering_delay_ms: u32) -> Self {
        self.loitering_delay_ms = Some(loitering_delay_ms);
        self
    }

    pub fn monitors(&self, transition: TransitionType) -> bool {
        self.transitions.contains(&transition)
    }

    /// 持久化时使用的逗号分隔形式，例如 `ENTER,DWELL`
    pub fn transitions_column(&self) -> String {
        self.transitions
            .iter()
            .map(TransitionType::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn parse_transitions_column(column: &str) -> GeofenceResult<Vec<TransitionType>> {
        column
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(str::parse)
            .collect()
    }
}

/// 区域与处理器的绑定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Registration {
    pub region: GeofenceRegion,
    pub handler_id: String,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    pub fn region_id(&self) -> &str {
        &self.region.id
    }
}

/// 一次围栏状态变化通知
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionEvent {
    pub region_id: String,
    pub transition: TransitionType,
    /// 平台给出的事件时间（毫秒时间戳）
    pub timestamp_ms: i64,
    pub dedup_key: String,
}

impl TransitionEvent {
    pub fn new(
        region_id: impl Into<String>,
        transition: TransitionType,
        timestamp_ms: i64,
        dedup_window_ms: i64,
    ) -> Self {
        let region_id = region_id.into();
        let dedup_key = Self::dedup_key_for(&region_id, transition, timestamp_ms, dedup_window_ms);
        Self {
            region_id,
            transition,
            timestamp_ms,
            dedup_key,
        }
    }

    /// 同一区域、同一变化类型、同一时间桶内的通知视为重复
    pub fn dedup_key_for(
        region_id: &str,
        transition: TransitionType,
        timestamp_ms: i64,
        dedup_window_ms: i64,
    ) -> String {
        let bucket = timestamp_ms.div_euclid(dedup_window_ms.max(1));
        format!("{region_id}:{transition}:{bucket}")
    }

    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }
}

/// 队列条目状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "IN_FLIGHT")]
    InFlight,
    #[serde(rename = "DELIVERED")]
    Delivered,
    #[serde(rename = "DEAD")]
    Dead,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "PENDING",
            EntryStatus::InFlight => "IN_FLIGHT",
            EntryStatus::Delivered => "DELIVERED",
            EntryStatus::Dead => "DEAD",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Delivered | EntryStatus::Dead)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = GeofenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(EntryStatus::Pending),
            "IN_FLIGHT" => Ok(EntryStatus::InFlight),
            "DELIVERED" => Ok(EntryStatus::Delivered),
            "DEAD" => Ok(EntryStatus::Dead),
            other => Err(GeofenceError::Internal(format!("未知的队列条目状态: {other}"))),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for EntryStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for EntryStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<EntryStatus>()
            .map_err(|e| format!("Invalid entry status: {e}").into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for EntryStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 队列中的待投递事件及其投递元数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub id: i64,
    pub event: TransitionEvent,
    /// 入队时解析出的处理器，投递时不再重新解析
    pub handler_id: String,
    pub status: EntryStatus,
    /// 已失败的投递次数
    pub attempts: u32,
    pub next_retry_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn entity_description(&self) -> String {
        format!(
            "队列条目 {} (区域: {}, 类型: {}, 处理器: {})",
            self.id, self.event.region_id, self.event.transition, self.handler_id
        )
    }
}

/// `mark_failed` 的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// 已安排重试
    Retrying {
        attempts: u32,
        next_retry_at: DateTime<Utc>,
    },
    /// 重试耗尽或永久失败，已进入死信
    DeadLettered { attempts: u32 },
    /// 条目已处于终态，未做修改
    AlreadyTerminal(EntryStatus),
}

/// 各状态的条目数量
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: u64,
    pub in_flight: u64,
    pub delivered: u64,
    pub dead: u64,
}

impl QueueStats {
    pub fn active(&self) -> u64 {
        self.pending + self.in_flight
    }
}
