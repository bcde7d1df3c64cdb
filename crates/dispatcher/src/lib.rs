pub mod cleanup_service;
pub mod dead_letter;
pub mod dispatch_service;

pub use cleanup_service::{CleanupConfig, CleanupService};
pub use dead_letter::{ChannelDeadLetterObserver, DeadLetter, LoggingDeadLetterObserver};
pub use dispatch_service::{DispatchService, DispatchServiceBuilder};
