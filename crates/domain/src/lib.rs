pub mod entities;
pub mod handlers;
pub mod repositories;
pub mod value_objects;

pub use entities::*;
pub use geofence_core::{GeofenceError, GeofenceResult};
pub use handlers::*;
pub use repositories::*;
pub use value_objects::*;
