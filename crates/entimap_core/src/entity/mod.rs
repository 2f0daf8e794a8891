//! Entity traits, identifiers and handles.

mod generator;
mod id;
mod reference;
mod traits;

pub use generator::{generator_for, IdGenerator, SequenceIdGenerator, TimestampIdGenerator};
pub use id::EntityId;
pub use reference::{EntityHandle, EntityRef};
pub use traits::{Entity, EntityKey};
