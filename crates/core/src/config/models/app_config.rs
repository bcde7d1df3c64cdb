use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    database::DatabaseConfig,
    dispatcher_worker::{QueueConfig, WorkerConfig},
    handlers::HandlerConfig,
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
    pub handlers: Vec<HandlerConfig>,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: GEOFENCE_, nested keys joined by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = ConfigBuilder::try_from(&AppConfig::default()).context("构建默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/geofence.toml",
                "geofence.toml",
                "/etc/geofence/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("GEOFENCE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.queue.validate().context("队列配置验证失败")?;
        self.worker.validate().context("Worker配置验证失败")?;
        self.api.validate().context("API配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        let mut seen = HashSet::new();
        for handler in &self.handlers {
            handler.validate().context("处理器配置验证失败")?;
            if !seen.insert(handler.id.as_str()) {
                return Err(anyhow::anyhow!("处理器ID重复: {}", handler.id));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::{HandlerKind, LogFormat};

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.backoff_base_ms, 1_000);
        assert_eq!(config.queue.backoff_max_ms, 300_000);
        assert_eq!(config.worker.handler_timeout_ms, 10_000);
        assert_eq!(config.worker.poll_interval_ms, 2_000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [database]
            url = "sqlite::memory:"

            [worker]
            batch_size = 32

            [observability]
            log_format = "json"

            [[handlers]]
            id = "audit"
            kind = "logging"

            [[handlers]]
            id = "backend"
            kind = "webhook"
            url = "https://example.com/geofence"
            timeout_ms = 3000
            "#,
        )
        .unwrap();

        assert_eq!(config.database.url, "sqlite::memory:");
        assert!(config.database.is_in_memory());
        assert_eq!(config.worker.batch_size, 32);
        assert_eq!(config.worker.max_concurrency, 4);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.handlers.len(), 2);
        assert_eq!(config.handlers[1].kind, HandlerKind::Webhook);
        assert_eq!(config.handlers[1].timeout_ms, Some(3000));
    }

    #[test]
    fn test_webhook_without_url_is_rejected() {
        let result = AppConfig::from_toml(
            r#"
            [[handlers]]
            id = "backend"
            kind = "webhook"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_handler_ids_are_rejected() {
        let result = AppConfig::from_toml(
            r#"
            [[handlers]]
            id = "audit"
            kind = "logging"

            [[handlers]]
            id = "audit"
            kind = "logging"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_jitter_is_rejected() {
        let mut config = AppConfig::default();
        config.queue.jitter_factor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_sqlite_url_is_rejected() {
        let mut config = AppConfig::default();
        config.database.url = "postgres://localhost/geofence".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_preserves_handlers() {
        let config = AppConfig::from_toml(
            r#"
            [[handlers]]
            id = "audit"
            kind = "logging"
            "#,
        )
        .unwrap();
        let serialized = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&serialized).unwrap();
        assert_eq!(parsed, config);
    }
}
