pub mod events;
pub mod health;
pub mod queue;
pub mod regions;
