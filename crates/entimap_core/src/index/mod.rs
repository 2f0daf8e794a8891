//! Identity indexing.
//!
//! [`IdentityIndex`] is the identity map behind both the session's visible
//! set and the repository's committed store: an owning list of entities
//! plus unique identifier and slug lookups.

mod identity;

pub use identity::{EntityRecord, IdentityIndex};
