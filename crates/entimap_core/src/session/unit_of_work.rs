//! Session implementation.

use crate::entity::{Entity, EntityRef};
use crate::error::CoreResult;
use crate::repository::Repository;
use crate::session::aggregate::Aggregate;
use crate::session::staging::StagingSummary;
use crate::session::tracked::{ErasedTrackedSet, TrackedSet};
use crate::transaction::{CommitBoundary, SessionTicket};
use crate::types::{EntityType, SessionId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, debug_span, trace};

/// Unit of work over the entities of a repository.
///
/// The session is an identity map: each committed entity is loaded at most
/// once (as a private copy, on first access to its type), and every entity
/// added to the session is reachable by identifier and slug right away.
///
/// Consistency is checked in two places:
/// - `add` and `replace` reject identifiers and slugs already visible,
///   as far as they are known at that moment
/// - `commit` re-reads every visible entity and rejects missing
///   identifiers and any duplicate, including those caused by fields the
///   caller changed after `add`
///
/// A joined session whose enlisted changes are thrown away by the ambient
/// transaction (abort or failed commit) rolls back on its next access,
/// losing anything staged since as well.
///
/// A failing commit changes nothing in the repository but does not undo
/// earlier `add`, `remove` or `replace` calls either: fix the offending
/// entity and commit again, or [`rollback`](Self::rollback).
///
/// # Example
///
/// ```rust,ignore
/// let mut session = repo.session();
///
/// let note = session.insert(Note::titled("draft"))?;
/// let id = note.read().id().unwrap();
/// assert!(session.get_by_id::<Note>(&id).unwrap().same_entity(&note));
///
/// note.write().slug = Some("final".into());
/// session.commit()?;
/// ```
pub struct Session {
    ticket: SessionTicket,
    repository: Repository,
    boundary: Arc<dyn CommitBoundary>,
    autocommit: bool,
    tracked: BTreeMap<EntityType, Box<dyn ErasedTrackedSet>>,
}

impl Session {
    /// Creates a session over `repository` that hands its commits to
    /// `boundary`.
    pub fn new(repository: Repository, boundary: Arc<dyn CommitBoundary>) -> Self {
        let id = SessionId::new();
        let autocommit = repository.config().autocommit;
        debug!(
            session = %id,
            repository = %repository.name(),
            joined = boundary.is_joined(),
            "session opened"
        );
        Self {
            ticket: SessionTicket::new(id),
            repository,
            boundary,
            autocommit,
            tracked: BTreeMap::new(),
        }
    }

    /// Returns the session ID.
    pub fn id(&self) -> SessionId {
        self.ticket.id()
    }

    /// Returns the repository the session was opened on.
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Returns `true` if commits are deferred to an ambient transaction.
    pub fn is_joined(&self) -> bool {
        self.boundary.is_joined()
    }

    /// Returns `true` if every mutation is committed right away.
    pub fn is_autocommit(&self) -> bool {
        self.autocommit
    }

    /// Rolls back if the ambient transaction threw away changes this
    /// session enlisted.
    fn sync_with_boundary(&mut self) {
        if self.ticket.take_discarded() {
            debug!(session = %self.id(), "enlisted changes discarded by ambient transaction");
            self.rollback();
        }
    }

    /// Returns the tracked set of `T`, loading it on first access.
    fn tracked_mut<T: Entity>(&mut self) -> &mut TrackedSet<T> {
        self.sync_with_boundary();
        let repository = &self.repository;
        let set = self
            .tracked
            .entry(EntityType::of::<T>())
            .or_insert_with(|| Box::new(TrackedSet::<T>::load(repository.snapshot::<T>())));
        match set.as_any_mut().downcast_mut::<TrackedSet<T>>() {
            Some(set) => set,
            None => unreachable!("tracked sets are keyed by their own entity type"),
        }
    }

    fn after_mutation(&mut self) -> CoreResult<()> {
        if self.autocommit {
            self.commit()?;
        }
        Ok(())
    }

    /// Adds an entity to the session.
    ///
    /// An entity without an identifier gets the next generated one; the
    /// slug is left alone. Fails with `DuplicateIdentifier` or
    /// `DuplicateSlug` if another visible entity already holds the
    /// identifier or the slug. Adding an entity that is already visible
    /// does nothing; re-adding a removed entity keeps its identifier.
    pub fn add<T: Entity>(&mut self, entity: &EntityRef<T>) -> CoreResult<()> {
        let ids = Arc::clone(self.repository.id_generator());
        let added = self.tracked_mut::<T>().add(entity, ids.as_ref())?;
        if added {
            trace!(
                session = %self.id(),
                entity_type = %EntityType::of::<T>(),
                id = ?entity.read().id(),
                "entity added"
            );
            self.after_mutation()?;
        }
        Ok(())
    }

    /// Wraps `value` in a new [`EntityRef`] and adds it.
    pub fn insert<T: Entity>(&mut self, value: T) -> CoreResult<EntityRef<T>> {
        let entity = EntityRef::new(value);
        self.add(&entity)?;
        Ok(entity)
    }

    /// Removes an entity from the session.
    ///
    /// Fails with `NotFound` unless this very instance is visible.
    pub fn remove<T: Entity>(&mut self, entity: &EntityRef<T>) -> CoreResult<()> {
        self.tracked_mut::<T>().remove(entity)?;
        trace!(
            session = %self.id(),
            entity_type = %EntityType::of::<T>(),
            id = ?entity.read().id(),
            "entity removed"
        );
        self.after_mutation()
    }

    /// Replaces the visible entity with the same identifier as `entity`.
    ///
    /// The old instance is dropped from the session as a whole, not merged
    /// into. Fails with `NotFound` if no visible entity has that
    /// identifier. Returns the displaced entity.
    pub fn replace<T: Entity>(&mut self, entity: &EntityRef<T>) -> CoreResult<EntityRef<T>> {
        let displaced = self.tracked_mut::<T>().replace(entity)?;
        trace!(
            session = %self.id(),
            entity_type = %EntityType::of::<T>(),
            id = ?entity.read().id(),
            "entity replaced"
        );
        self.after_mutation()?;
        Ok(displaced)
    }

    /// Looks up a visible entity by identifier.
    pub fn get_by_id<T: Entity>(&mut self, id: &T::Id) -> Option<EntityRef<T>> {
        self.tracked_mut::<T>().get_by_id(id).cloned()
    }

    /// Looks up a visible entity by slug.
    pub fn get_by_slug<T: Entity>(&mut self, slug: &str) -> Option<EntityRef<T>> {
        self.tracked_mut::<T>().get_by_slug(slug).cloned()
    }

    /// Checks whether this very instance is visible.
    pub fn contains<T: Entity>(&mut self, entity: &EntityRef<T>) -> bool {
        self.tracked_mut::<T>().contains(entity)
    }

    /// Returns the number of visible entities of type `T`.
    pub fn len<T: Entity>(&mut self) -> usize {
        self.tracked_mut::<T>().len()
    }

    /// Iterates over the visible entities of type `T` in insertion order.
    pub fn iter<T: Entity>(&mut self) -> impl Iterator<Item = &EntityRef<T>> + '_ {
        self.tracked_mut::<T>().entities()
    }

    /// Returns all visible entities of type `T`.
    pub fn get_all<T: Entity>(&mut self) -> Vec<EntityRef<T>> {
        self.iter::<T>().cloned().collect()
    }

    /// Returns what is staged for type `T`.
    pub fn staging<T: Entity>(&mut self) -> StagingSummary {
        self.tracked_mut::<T>().summary()
    }

    /// Returns `true` if any entity type has staged additions, removals or
    /// replacements.
    pub fn has_staged_changes(&self) -> bool {
        !self.ticket.is_discarded() && self.tracked.values().any(|set| !set.summary().is_empty())
    }

    /// Returns a typed view of the session for entity type `T`.
    pub fn aggregate<T: Entity>(&mut self) -> Aggregate<'_, T> {
        Aggregate::new(self)
    }

    /// Validates all staged changes and hands them to the commit boundary.
    ///
    /// Every visible entity, and every removed one that was committed
    /// before, must have an identifier (`InvalidState`); identifiers and
    /// non-null slugs must be unique per entity type
    /// (`DuplicateIdentifier`, `DuplicateSlug`). Nothing is handed on if
    /// any check fails.
    ///
    /// Without an ambient transaction, changes are applied one entity type
    /// at a time; if a later type fails against the repository, the types
    /// applied before it stay applied.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.sync_with_boundary();
        let span = debug_span!("commit", session = %self.id());
        let _enter = span.enter();

        for set in self.tracked.values_mut() {
            if let Err(e) = set.validate() {
                debug!(entity_type = %set.entity_type(), error = %e, "commit rejected");
                return Err(e);
            }
        }

        let flushes: Vec<_> = self
            .tracked
            .values()
            .filter_map(|set| set.flush(&self.repository))
            .collect();
        let flush_count = flushes.len();
        if !flushes.is_empty() {
            self.boundary.finalize(&self.ticket, flushes)?;
        }

        for set in self.tracked.values_mut() {
            set.mark_committed();
        }
        debug!(flushes = flush_count, joined = self.is_joined(), "commit finished");
        Ok(())
    }

    /// Discards all staged changes and every loaded entity.
    ///
    /// The next access to an entity type reloads it from the repository.
    pub fn rollback(&mut self) {
        debug!(session = %self.id(), types = self.tracked.len(), "session rolled back");
        self.tracked.clear();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("repository", &self.repository.name())
            .field("joined", &self.is_joined())
            .field("entity_types", &self.tracked.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
