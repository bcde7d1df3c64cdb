pub mod sqlite_event_queue;
pub mod sqlite_registration_store;

pub use sqlite_event_queue::SqliteEventQueue;
pub use sqlite_registration_store::SqliteRegistrationStore;
