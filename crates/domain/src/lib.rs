pub mod entities;
pub mod messaging;
pub mod value_objects;

pub use entities::*;
pub use messaging::*;
pub use scaffolder_errors::{PoolError, PoolResult};
pub use value_objects::*;
