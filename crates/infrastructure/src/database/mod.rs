pub mod manager;
pub mod mapping;
pub mod schema;
pub mod sqlite;

pub use manager::DatabaseManager;
pub use sqlite::{SqliteEventQueue, SqliteRegistrationStore};
