pub mod errors;
pub mod events;
pub mod schedule;
pub mod subscription;
pub mod value_objects;

pub use errors::*;
pub use events::*;
pub use value_objects::*;
