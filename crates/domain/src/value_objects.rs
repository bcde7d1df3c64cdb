use std::time::Duration;

use geofence_core::{config::QueueConfig, GeofenceError, GeofenceResult};
use serde::{Deserialize, Serialize};

/// WGS84 坐标
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> GeofenceResult<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(GeofenceError::invalid_region(format!(
                "纬度超出范围[-90, 90]: {latitude}"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(GeofenceError::invalid_region(format!(
                "经度超出范围[-180, 180]: {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// 投递失败后的重试策略
///
/// 第 n 次失败后的等待时间为 `base * multiplier^(n-1)`，不超过 `max_delay`，
/// 再叠加 `±jitter_factor` 比例的随机抖动以避免雷群效应。
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 失败次数超过该值后进入死信
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(300),
            jitter_factor: 0.2,
        }
    }
}

impl From<&QueueConfig> for RetryPolicy {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.backoff_base_ms),
            multiplier: config.backoff_multiplier,
            max_delay: Duration::from_millis(config.backoff_max_ms),
            jitter_factor: config.jitter_factor,
        }
    }
}

impl RetryPolicy {
    /// 已失败 `attempts` 次后是否应进入死信
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts > self.max_attempts
    }

    /// 不含抖动的退避时间
    pub fn base_backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(63) as i32;
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let backoff_ms = (base_ms * self.multiplier.powi(exponent)).min(max_ms);
        Duration::from_millis(backoff_ms as u64)
    }

    /// 使用给定的抖动样本计算退避时间，`sample` 取值范围为 [-1.0, 1.0]
    pub fn backoff_with_sample(&self, attempts: u32, sample: f64) -> Duration {
        let backoff_ms = self.base_backoff(attempts).as_millis() as f64;
        let sample = sample.clamp(-1.0, 1.0);
        let jittered = backoff_ms * (1.0 + self.jitter_factor * sample);
        Duration::from_millis(jittered.max(0.0).round() as u64)
    }

    /// 计算下一次重试前的等待时间
    pub fn next_backoff(&self, attempts: u32) -> Duration {
        let sample = (rand::random::<f64>() - 0.5) * 2.0;
        self.backoff_with_sample(attempts, sample)
    }
}
