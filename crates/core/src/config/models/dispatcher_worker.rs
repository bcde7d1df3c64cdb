use serde::{Deserialize, Serialize};

/// 事件队列配置：重试、退避、去重与保留策略
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// 失败次数超过该值后进入死信
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_multiplier: f64,
    pub backoff_max_ms: u64,
    /// 退避时间的随机抖动比例（0.0-1.0）
    pub jitter_factor: f64,
    /// 去重时间桶宽度
    pub dedup_window_ms: i64,
    /// 已投递条目的保留时间
    pub retention_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 1_000,
            backoff_multiplier: 2.0,
            backoff_max_ms: 300_000, // 5分钟
            jitter_factor: 0.2,
            dedup_window_ms: 60_000,
            retention_seconds: 86_400, // 24小时
            cleanup_interval_seconds: 3_600,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backoff_base_ms == 0 {
            return Err(anyhow::anyhow!("退避基础间隔必须大于0"));
        }

        if self.backoff_multiplier < 1.0 {
            return Err(anyhow::anyhow!("退避倍数不能小于1.0"));
        }

        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(anyhow::anyhow!("最大退避间隔不能小于基础间隔"));
        }

        if !(0.0..1.0).contains(&self.jitter_factor) {
            return Err(anyhow::anyhow!(
                "抖动比例必须在[0.0, 1.0)之间: {}",
                self.jitter_factor
            ));
        }

        if self.dedup_window_ms <= 0 {
            return Err(anyhow::anyhow!("去重时间窗口必须大于0"));
        }

        if self.cleanup_interval_seconds == 0 {
            return Err(anyhow::anyhow!("清理间隔必须大于0"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    pub batch_size: usize,
    /// 单批次内并发调用处理器的上限
    pub max_concurrency: usize,
    pub handler_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            max_concurrency: 4,
            handler_timeout_ms: 10_000,
            poll_interval_ms: 2_000,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("批次大小必须大于0"));
        }

        if self.max_concurrency == 0 {
            return Err(anyhow::anyhow!("最大并发数必须大于0"));
        }

        if self.handler_timeout_ms == 0 {
            return Err(anyhow::anyhow!("处理器超时时间必须大于0"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }

        Ok(())
    }
}
