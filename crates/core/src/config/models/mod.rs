pub mod api_observability;
pub mod app_config;
pub mod database;
pub mod dispatcher_worker;
pub mod handlers;

// Re-export main types for easier imports
pub use api_observability::{ApiConfig, LogFormat, ObservabilityConfig};
pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use dispatcher_worker::{QueueConfig, WorkerConfig};
pub use handlers::{HandlerConfig, HandlerKind};
