//! Identity index implementation.

use crate::entity::{Entity, EntityHandle, EntityRef};
use crate::error::{CoreError, CoreResult};
use crate::types::EntityType;
use std::collections::HashMap;

/// A tracked entity together with the keys it is indexed under.
///
/// The keys are those read when the entity was last indexed. The caller may
/// have changed the entity since; [`IdentityIndex::rebuild`] re-reads them.
#[derive(Debug)]
pub struct EntityRecord<T: Entity> {
    entity: EntityRef<T>,
    id: Option<T::Id>,
    slug: Option<String>,
}

impl<T: Entity> EntityRecord<T> {
    fn read(entity: EntityRef<T>) -> Self {
        let (id, slug) = {
            let guard = entity.read();
            (guard.id(), guard.slug())
        };
        Self { entity, id, slug }
    }

    /// Returns the tracked entity.
    pub fn entity(&self) -> &EntityRef<T> {
        &self.entity
    }

    /// Returns the indexed identifier.
    pub fn id(&self) -> Option<&T::Id> {
        self.id.as_ref()
    }

    /// Returns the indexed slug.
    pub fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    /// Returns the identity handle of the tracked entity.
    pub fn handle(&self) -> EntityHandle {
        self.entity.handle()
    }

    /// Consumes the record, returning the entity.
    pub fn into_entity(self) -> EntityRef<T> {
        self.entity
    }
}

impl<T: Entity> Clone for EntityRecord<T> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            id: self.id.clone(),
            slug: self.slug.clone(),
        }
    }
}

/// Hash-based identity map over one entity type.
///
/// Holds the owning references of a set of entities in insertion order,
/// plus two unique lookups: identifier to entity and slug to entity. Null
/// keys are never indexed.
///
/// # Example
///
/// ```rust,ignore
/// let mut index: IdentityIndex<Note> = IdentityIndex::new();
///
/// index.insert(EntityRef::new(note))?;
/// let found = index.get_by_id(&7);
/// ```
#[derive(Debug)]
pub struct IdentityIndex<T: Entity> {
    /// Entity type, for error messages.
    entity_type: EntityType,
    /// Handle to record mapping. The only owner of the entities.
    records: HashMap<EntityHandle, EntityRecord<T>>,
    /// Insertion order.
    order: Vec<EntityHandle>,
    /// Identifier lookup.
    by_id: HashMap<T::Id, EntityHandle>,
    /// Slug lookup.
    by_slug: HashMap<String, EntityHandle>,
}

impl<T: Entity> IdentityIndex<T> {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            entity_type: EntityType::of::<T>(),
            records: HashMap::new(),
            order: Vec::new(),
            by_id: HashMap::new(),
            by_slug: HashMap::new(),
        }
    }

    fn type_name(&self) -> &'static str {
        self.entity_type.name()
    }

    /// Returns the number of indexed entities.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Checks whether the given instance is indexed.
    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.records.contains_key(&handle)
    }

    /// Returns the record of the given instance.
    pub fn get(&self, handle: EntityHandle) -> Option<&EntityRecord<T>> {
        self.records.get(&handle)
    }

    /// Checks whether an entity is indexed under the identifier.
    ///
    /// Reads the keys recorded at indexing time, not the entities.
    pub fn has_id(&self, id: &T::Id) -> bool {
        self.by_id.contains_key(id)
    }

    /// Checks whether an entity is indexed under the slug.
    ///
    /// Reads the keys recorded at indexing time, not the entities.
    pub fn has_slug(&self, slug: &str) -> bool {
        self.by_slug.contains_key(slug)
    }

    /// Looks up an entity by its current identifier.
    ///
    /// Identifiers can change after an entity was indexed, so a stale hit
    /// or a miss in the map falls back to comparing the current identifier
    /// of every entity.
    pub fn get_by_id(&self, id: &T::Id) -> Option<&EntityRef<T>> {
        self.find_by_id(id).map(EntityRecord::entity)
    }

    /// Looks up an entity by its current slug.
    ///
    /// Slugs can be assigned or changed after an entity was indexed, so a
    /// stale hit or a miss in the slug map falls back to comparing the
    /// current slug of every entity.
    pub fn get_by_slug(&self, slug: &str) -> Option<&EntityRef<T>> {
        if let Some(record) = self.slug_holder(slug) {
            return Some(&record.entity);
        }
        self.entities()
            .find(|entity| entity.read().slug().as_deref() == Some(slug))
    }

    /// Returns the record mapped to `id` if its entity still has that id.
    fn id_holder(&self, id: &T::Id) -> Option<&EntityRecord<T>> {
        let record = self.by_id.get(id).and_then(|h| self.records.get(h))?;
        let current = record.entity.read().id();
        (current.as_ref() == Some(id)).then_some(record)
    }

    /// Returns the record mapped to `slug` if its entity still has that slug.
    fn slug_holder(&self, slug: &str) -> Option<&EntityRecord<T>> {
        let record = self.by_slug.get(slug).and_then(|h| self.records.get(h))?;
        let current = record.entity.read().slug();
        (current.as_deref() == Some(slug)).then_some(record)
    }

    fn find_by_id(&self, id: &T::Id) -> Option<&EntityRecord<T>> {
        self.id_holder(id).or_else(|| {
            self.iter()
                .find(|record| record.entity.read().id().as_ref() == Some(id))
        })
    }

    /// Indexes an entity under its current identifier and slug.
    ///
    /// An entity without an identifier is accepted but only reachable by
    /// slug and by iteration. The duplicate checks only see keys recorded
    /// at indexing time that their entities still hold; [`rebuild`] does
    /// the full check.
    ///
    /// [`rebuild`]: Self::rebuild
    pub fn insert(&mut self, entity: EntityRef<T>) -> CoreResult<()> {
        let record = EntityRecord::read(entity);
        let handle = record.handle();
        if self.records.contains_key(&handle) {
            return Err(CoreError::invalid_operation("entity is already indexed"));
        }
        self.check_available(record.id.as_ref(), record.slug.as_deref())?;

        self.link(&record);
        self.order.push(handle);
        self.records.insert(handle, record);
        Ok(())
    }

    /// Removes an instance from the index.
    pub fn remove(&mut self, handle: EntityHandle) -> Option<EntityRecord<T>> {
        let record = self.records.remove(&handle)?;
        self.unlink(&record);
        self.order.retain(|h| *h != handle);
        Some(record)
    }

    /// Removes whatever instance currently has the identifier.
    pub fn remove_by_id(&mut self, id: &T::Id) -> Option<EntityRecord<T>> {
        let handle = self.find_by_id(id)?.handle();
        self.remove(handle)
    }

    /// Fails if a visible entity still holds `id` or `slug` under the keys
    /// it was indexed with.
    pub fn check_available(&self, id: Option<&T::Id>, slug: Option<&str>) -> CoreResult<()> {
        if let Some(id) = id {
            if self.id_holder(id).is_some() {
                return Err(CoreError::duplicate_identifier(self.type_name(), id));
            }
        }
        if let Some(slug) = slug {
            if self.slug_holder(slug).is_some() {
                return Err(CoreError::duplicate_slug(self.type_name(), slug));
            }
        }
        Ok(())
    }

    /// Replaces the entity indexed under the new entity's identifier.
    ///
    /// The new entity takes the old one's position in iteration order.
    /// Returns the record of the displaced entity.
    pub fn replace(&mut self, entity: EntityRef<T>) -> CoreResult<EntityRecord<T>> {
        let record = EntityRecord::read(entity);
        let id = match &record.id {
            Some(id) => id,
            None => return Err(CoreError::not_found(self.type_name(), None::<&str>)),
        };
        let old_handle = match self.find_by_id(id) {
            Some(old) => old.handle(),
            None => return Err(CoreError::not_found(self.type_name(), Some(id))),
        };
        let new_handle = record.handle();
        if new_handle != old_handle && self.records.contains_key(&new_handle) {
            return Err(CoreError::invalid_operation(
                "replacement entity is already indexed under another key",
            ));
        }
        if let Some(slug) = &record.slug {
            if matches!(self.slug_holder(slug), Some(holder) if holder.handle() != old_handle) {
                return Err(CoreError::duplicate_slug(self.type_name(), slug.as_str()));
            }
        }

        let old = self
            .records
            .remove(&old_handle)
            .ok_or_else(|| CoreError::not_found(self.type_name(), Some(id)))?;
        self.unlink(&old);
        self.link(&record);
        for slot in self.order.iter_mut().filter(|h| **h == old_handle) {
            *slot = new_handle;
        }
        self.records.insert(new_handle, record);
        Ok(old)
    }

    /// Re-reads every entity's identifier and slug and rebuilds both maps.
    ///
    /// Fails without touching the index if an entity has no identifier or
    /// two entities share an identifier or a slug.
    pub fn rebuild(&mut self) -> CoreResult<()> {
        let mut by_id = HashMap::with_capacity(self.order.len());
        let mut by_slug = HashMap::with_capacity(self.order.len());
        let mut keys = Vec::with_capacity(self.order.len());

        for record in self.iter() {
            let (id, slug) = {
                let guard = record.entity.read();
                (guard.id(), guard.slug())
            };
            let id = id.ok_or_else(CoreError::missing_id)?;
            let handle = record.handle();
            if by_id.insert(id.clone(), handle).is_some() {
                return Err(CoreError::duplicate_identifier(self.type_name(), &id));
            }
            if let Some(slug) = &slug {
                if by_slug.insert(slug.clone(), handle).is_some() {
                    return Err(CoreError::duplicate_slug(self.type_name(), slug.as_str()));
                }
            }
            keys.push((handle, id, slug));
        }

        for (handle, id, slug) in keys {
            if let Some(record) = self.records.get_mut(&handle) {
                record.id = Some(id);
                record.slug = slug;
            }
        }
        self.by_id = by_id;
        self.by_slug = by_slug;
        Ok(())
    }

    /// Iterates over the records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord<T>> + '_ {
        self.order.iter().filter_map(|h| self.records.get(h))
    }

    /// Iterates over the entities in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityRef<T>> + '_ {
        self.iter().map(EntityRecord::entity)
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
        self.by_id.clear();
        self.by_slug.clear();
    }

    /// Adds the record's keys to the maps.
    fn link(&mut self, record: &EntityRecord<T>) {
        let handle = record.handle();
        if let Some(id) = &record.id {
            self.by_id.insert(id.clone(), handle);
        }
        if let Some(slug) = &record.slug {
            self.by_slug.insert(slug.clone(), handle);
        }
    }

    /// Removes the record's keys from the maps, if they still point at it.
    fn unlink(&mut self, record: &EntityRecord<T>) {
        let handle = record.handle();
        if let Some(id) = &record.id {
            if self.by_id.get(id) == Some(&handle) {
                self.by_id.remove(id);
            }
        }
        if let Some(slug) = &record.slug {
            if self.by_slug.get(slug) == Some(&handle) {
                self.by_slug.remove(slug);
            }
        }
    }
}

impl<T: Entity> Default for IdentityIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Clone for IdentityIndex<T> {
    /// Clones the maps; the entities themselves are shared.
    fn clone(&self) -> Self {
        Self {
            entity_type: self.entity_type,
            records: self.records.clone(),
            order: self.order.clone(),
            by_id: self.by_id.clone(),
            by_slug: self.by_slug.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: Option<u64>,
        slug: Option<String>,
        value: i32,
    }

    impl Entity for Item {
        type Id = u64;

        fn id(&self) -> Option<u64> {
            self.id
        }

        fn set_id(&mut self, id: Option<u64>) {
            self.id = id;
        }

        fn slug(&self) -> Option<String> {
            self.slug.clone()
        }
    }

    fn item(id: Option<u64>, slug: Option<&str>) -> EntityRef<Item> {
        EntityRef::new(Item {
            id,
            slug: slug.map(str::to_string),
            value: 0,
        })
    }

    #[test]
    fn insert_and_lookup() {
        let mut index = IdentityIndex::new();
        let a = item(Some(1), Some("a"));
        index.insert(a.clone()).unwrap();

        assert!(index.get_by_id(&1).unwrap().same_entity(&a));
        assert!(index.get_by_slug("a").unwrap().same_entity(&a));
        assert!(index.contains(a.handle()));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn zero_id_is_indexed() {
        let mut index = IdentityIndex::new();
        let a = item(Some(0), None);
        index.insert(a.clone()).unwrap();
        assert!(index.has_id(&0));
        assert!(index.get_by_id(&0).unwrap().same_entity(&a));
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut index = IdentityIndex::new();
        index.insert(item(Some(1), None)).unwrap();
        let err = index.insert(item(Some(1), None)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateIdentifier { .. }));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn duplicate_slug_rejected() {
        let mut index = IdentityIndex::new();
        index.insert(item(Some(1), Some("x"))).unwrap();
        let err = index.insert(item(Some(2), Some("x"))).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateSlug { .. }));
    }

    #[test]
    fn same_instance_twice_rejected() {
        let mut index = IdentityIndex::new();
        let a = item(Some(1), None);
        index.insert(a.clone()).unwrap();
        assert!(matches!(
            index.insert(a),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn remove_unlinks_keys() {
        let mut index = IdentityIndex::new();
        let a = item(Some(1), Some("a"));
        index.insert(a.clone()).unwrap();

        let record = index.remove(a.handle()).unwrap();
        assert!(record.entity().same_entity(&a));
        assert!(index.get_by_id(&1).is_none());
        assert!(index.get_by_slug("a").is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn slug_assigned_later_is_found_by_scan() {
        let mut index = IdentityIndex::new();
        let a = item(Some(1), None);
        index.insert(a.clone()).unwrap();
        a.write().slug = Some("late".into());

        assert!(!index.has_slug("late"));
        assert!(index.get_by_slug("late").unwrap().same_entity(&a));
    }

    #[test]
    fn moved_slug_is_released() {
        let mut index = IdentityIndex::new();
        let a = item(Some(1), Some("x"));
        index.insert(a.clone()).unwrap();
        a.write().slug = Some("y".into());

        assert!(index.get_by_slug("x").is_none());
        assert!(index.get_by_slug("y").unwrap().same_entity(&a));

        let b = item(Some(2), Some("x"));
        index.insert(b.clone()).unwrap();
        assert!(index.get_by_slug("x").unwrap().same_entity(&b));
        index.rebuild().unwrap();
    }

    #[test]
    fn changed_id_is_found_by_scan() {
        let mut index = IdentityIndex::new();
        let a = item(Some(1), None);
        index.insert(a.clone()).unwrap();
        a.write().id = Some(4);

        assert!(index.get_by_id(&1).is_none());
        assert!(index.get_by_id(&4).unwrap().same_entity(&a));
        index.insert(item(Some(1), None)).unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn replace_keeps_position() {
        let mut index = IdentityIndex::new();
        let a = item(Some(1), Some("a"));
        let b = item(Some(2), Some("b"));
        index.insert(a.clone()).unwrap();
        index.insert(b.clone()).unwrap();

        let a2 = item(Some(1), Some("a2"));
        let old = index.replace(a2.clone()).unwrap();
        assert!(old.entity().same_entity(&a));

        let order: Vec<_> = index.entities().map(EntityRef::handle).collect();
        assert_eq!(order, vec![a2.handle(), b.handle()]);
        assert!(index.get_by_slug("a").is_none());
        assert!(index.get_by_slug("a2").unwrap().same_entity(&a2));
    }

    #[test]
    fn replace_unknown_id_is_not_found() {
        let mut index: IdentityIndex<Item> = IdentityIndex::new();
        assert!(matches!(
            index.replace(item(Some(9), None)),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            index.replace(item(None, None)),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn replace_with_taken_slug_rejected() {
        let mut index = IdentityIndex::new();
        index.insert(item(Some(1), Some("a"))).unwrap();
        index.insert(item(Some(2), Some("b"))).unwrap();

        let err = index.replace(item(Some(1), Some("b"))).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateSlug { .. }));
        assert!(index.get_by_slug("a").is_some());
    }

    #[test]
    fn rebuild_picks_up_mutations() {
        let mut index = IdentityIndex::new();
        let a = item(Some(1), Some("a"));
        index.insert(a.clone()).unwrap();
        {
            let mut guard = a.write();
            guard.id = Some(5);
            guard.slug = Some("moved".into());
        }

        index.rebuild().unwrap();
        assert!(index.get_by_id(&1).is_none());
        assert!(index.get_by_id(&5).unwrap().same_entity(&a));
        assert!(index.has_slug("moved"));
        assert_eq!(index.get(a.handle()).unwrap().id(), Some(&5));
    }

    #[test]
    fn rebuild_rejects_missing_id() {
        let mut index = IdentityIndex::new();
        let a = item(Some(1), None);
        index.insert(a.clone()).unwrap();
        a.write().id = None;

        let err = index.rebuild().unwrap_err();
        assert_eq!(err, CoreError::missing_id());
        // Old keys survive a failed rebuild.
        assert!(index.has_id(&1));
    }

    #[test]
    fn rebuild_rejects_collisions() {
        let mut index = IdentityIndex::new();
        let a = item(Some(1), Some("a"));
        let b = item(Some(2), Some("b"));
        index.insert(a).unwrap();
        index.insert(b.clone()).unwrap();

        b.write().slug = Some("a".into());
        assert!(matches!(index.rebuild(), Err(CoreError::DuplicateSlug { .. })));

        b.write().slug = None;
        b.write().id = Some(1);
        assert!(matches!(
            index.rebuild(),
            Err(CoreError::DuplicateIdentifier { .. })
        ));
    }

    #[test]
    fn clone_shares_entities() {
        let mut index = IdentityIndex::new();
        let a = item(Some(1), None);
        index.insert(a.clone()).unwrap();

        let copy = index.clone();
        a.write().value = 3;
        assert_eq!(copy.get_by_id(&1).unwrap().read().value, 3);
    }
}
