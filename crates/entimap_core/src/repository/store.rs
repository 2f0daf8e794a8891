//! Committed entity stores.

use crate::entity::{Entity, EntityRef};
use crate::error::{CoreError, CoreResult};
use crate::index::IdentityIndex;
use crate::types::EntityType;
use std::any::Any;
use std::collections::HashMap;

/// Write of one entity in a [`ChangeSet`].
#[derive(Debug, Clone)]
pub struct Upsert<T: Entity> {
    /// Identifier the entity was committed under before, if it was.
    pub previous: Option<T::Id>,
    /// New state of the entity.
    pub value: T,
}

/// Deletes and upserts produced by one session commit for one entity type.
#[derive(Debug, Clone)]
pub struct ChangeSet<T: Entity> {
    deletes: Vec<T::Id>,
    upserts: Vec<Upsert<T>>,
}

impl<T: Entity> ChangeSet<T> {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self {
            deletes: Vec::new(),
            upserts: Vec::new(),
        }
    }

    /// Records the deletion of the entity committed under `id`.
    pub fn delete(&mut self, id: T::Id) {
        self.deletes.push(id);
    }

    /// Records a new or modified entity.
    pub fn upsert(&mut self, previous: Option<T::Id>, value: T) {
        self.upserts.push(Upsert { previous, value });
    }

    /// Returns the recorded deletions.
    pub fn deletes(&self) -> &[T::Id] {
        &self.deletes
    }

    /// Returns the recorded upserts.
    pub fn upserts(&self) -> &[Upsert<T>] {
        &self.upserts
    }

    /// Returns the number of writes.
    pub fn len(&self) -> usize {
        self.deletes.len() + self.upserts.len()
    }

    /// Returns `true` if there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.upserts.is_empty()
    }
}

impl<T: Entity> Default for ChangeSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Committed entities of one type.
///
/// The store owns its entities privately: sessions receive copies and
/// hand back new states through [`ChangeSet`]s, so nothing a caller does
/// to a session's entities leaks in before a commit.
#[derive(Debug)]
pub struct EntityStore<T: Entity> {
    /// Committed entities.
    index: IdentityIndex<T>,
    /// Number of change sets applied.
    version: u64,
}

impl<T: Entity> EntityStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            index: IdentityIndex::new(),
            version: 0,
        }
    }

    /// Returns the number of committed entities.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the number of change sets applied so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns a copy of the entity committed under `id`.
    pub fn get_by_id(&self, id: &T::Id) -> Option<T> {
        self.index.get_by_id(id).map(EntityRef::snapshot)
    }

    /// Returns a copy of the entity committed under `slug`.
    pub fn get_by_slug(&self, slug: &str) -> Option<T> {
        self.index.get_by_slug(slug).map(EntityRef::snapshot)
    }

    /// Returns copies of all committed entities in commit order.
    pub fn snapshot(&self) -> Vec<T> {
        self.index.entities().map(EntityRef::snapshot).collect()
    }

    /// Adds an entity outside of any session.
    ///
    /// The entity must already have an identifier.
    pub fn insert(&mut self, value: T) -> CoreResult<()> {
        if value.id().is_none() {
            return Err(CoreError::missing_id());
        }
        self.index.insert(EntityRef::new(value))
    }

    /// Applies a change set.
    ///
    /// The writes are applied to a copy of the index which replaces the
    /// current one only if every write succeeds. Every upserted entity is
    /// unlinked from its previous keys before any is re-inserted, so keys
    /// may move between entities within one change set. Upserted entities
    /// move to the end of commit order.
    pub fn apply(&mut self, changes: ChangeSet<T>) -> CoreResult<()> {
        let mut next = self.index.clone();

        for id in &changes.deletes {
            next.remove_by_id(id);
        }
        for previous in changes.upserts.iter().filter_map(|u| u.previous.as_ref()) {
            next.remove_by_id(previous);
        }
        for Upsert { value, .. } in changes.upserts {
            if value.id().is_none() {
                return Err(CoreError::missing_id());
            }
            next.insert(EntityRef::new(value))?;
        }

        self.index = next;
        self.version += 1;
        Ok(())
    }
}

impl<T: Entity> Default for EntityStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type map from entity type to its [`EntityStore`].
#[derive(Default)]
pub(crate) struct StoreMap {
    stores: HashMap<EntityType, Box<dyn Any + Send + Sync>>,
}

impl StoreMap {
    pub(crate) fn get<T: Entity>(&self) -> Option<&EntityStore<T>> {
        self.stores.get(&EntityType::of::<T>())?.downcast_ref::<EntityStore<T>>()
    }

    pub(crate) fn get_or_init<T: Entity>(&mut self) -> &mut EntityStore<T> {
        let store = self
            .stores
            .entry(EntityType::of::<T>())
            .or_insert_with(|| Box::new(EntityStore::<T>::new()));
        match store.downcast_mut::<EntityStore<T>>() {
            Some(store) => store,
            None => unreachable!("store map entries are keyed by their own entity type"),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.stores.len()
    }
}
