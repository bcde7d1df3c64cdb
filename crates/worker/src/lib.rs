pub mod dispatch_worker;
pub mod handler_registry;
pub mod handlers;

pub use dispatch_worker::{DispatchWorker, WorkerStats};
pub use handler_registry::HandlerRegistry;
pub use handlers::{LoggingHandler, WebhookHandler};
