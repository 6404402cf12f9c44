pub mod body;
pub mod collection;
pub mod entity_type;
pub mod error;
pub mod ids;
pub mod operations;

pub use body::{Body, EntityRef, RefSlot};
pub use collection::Collection;
pub use entity_type::{EntityKind, EntityType};
pub use error::CoreError;
pub use ids::*;
pub use operations::{Deferred, Operation, OperationGroup, Verb};
