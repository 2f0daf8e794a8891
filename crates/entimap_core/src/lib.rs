//! # EntiMap Core
//!
//! In-memory identity map and unit of work for domain entities.
//!
//! This crate provides:
//! - An identity-keyed [`Session`] that keeps every loaded or added entity
//!   reachable by identifier and slug
//! - Staging of additions, removals and replacements until commit
//! - Uniqueness and completeness checks on identifiers and slugs
//! - A shared [`Repository`] holding committed entities per type
//! - Commit boundaries, either immediate or deferred to an
//!   [`AmbientTransaction`]

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entity;
mod error;
mod index;
mod repository;
mod session;
mod transaction;
mod types;

pub use config::{IdStrategy, RepositoryConfig};
pub use entity::{
    generator_for, Entity, EntityHandle, EntityId, EntityKey, EntityRef, IdGenerator,
    SequenceIdGenerator, TimestampIdGenerator,
};
pub use error::{CoreError, CoreResult, MISSING_ID_MESSAGE};
pub use index::{EntityRecord, IdentityIndex};
pub use repository::{ChangeSet, EntityStore, Repository, Upsert};
pub use session::{Aggregate, Session, StagingSummary};
pub use transaction::{
    AmbientTransaction, Autonomous, CommitBoundary, PendingFlush, SessionTicket,
};
pub use types::{EntityType, SessionId};
