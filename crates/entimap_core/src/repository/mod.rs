//! Repositories and their committed stores.

mod memory;
mod store;

pub use memory::Repository;
pub use store::{ChangeSet, EntityStore, Upsert};
