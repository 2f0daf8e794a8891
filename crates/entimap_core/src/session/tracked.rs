//! Per-type session state.

use crate::entity::{Entity, EntityKey, EntityRef, IdGenerator};
use crate::error::{CoreError, CoreResult};
use crate::index::IdentityIndex;
use crate::repository::Repository;
use crate::session::staging::{StagingArea, StagingSummary};
use crate::transaction::PendingFlush;
use crate::types::EntityType;
use std::any::Any;
use tracing::{trace, warn};

/// Visible entities of one type plus the changes staged on them.
pub(crate) struct TrackedSet<T: Entity> {
    entity_type: EntityType,
    visible: IdentityIndex<T>,
    staging: StagingArea<T>,
}

impl<T: Entity> TrackedSet<T> {
    /// Builds the set from entities committed in the repository.
    pub(crate) fn load(committed: Vec<T>) -> Self {
        let mut set = Self {
            entity_type: EntityType::of::<T>(),
            visible: IdentityIndex::new(),
            staging: StagingArea::new(),
        };
        for value in committed {
            let entity = EntityRef::new(value);
            match set.visible.insert(entity.clone()) {
                Ok(()) => set.staging.track_loaded(&entity),
                Err(e) => warn!(entity_type = %set.entity_type, error = %e, "skipping committed entity"),
            }
        }
        trace!(entity_type = %set.entity_type, count = set.visible.len(), "loaded committed entities");
        set
    }

    fn name(&self) -> &'static str {
        self.entity_type.name()
    }

    /// Adds an entity, assigning an identifier if it has none.
    ///
    /// Returns `false` if the entity was already visible. On failure the
    /// entity is left as it was passed in.
    pub(crate) fn add(&mut self, entity: &EntityRef<T>, ids: &dyn IdGenerator) -> CoreResult<bool> {
        if self.visible.contains(entity.handle()) {
            return Ok(false);
        }
        let (id, slug) = {
            let guard = entity.read();
            (guard.id(), guard.slug())
        };
        self.visible.check_available(id.as_ref(), slug.as_deref())?;

        let generated = id.is_none();
        if generated {
            entity
                .write()
                .set_id(Some(T::Id::from_generated(ids.next_id())));
        }
        if let Err(e) = self.visible.insert(entity.clone()) {
            // A slug derived from the new id can still collide.
            if generated {
                entity.write().set_id(None);
            }
            return Err(e);
        }
        self.staging.stage_add(entity);
        Ok(true)
    }

    pub(crate) fn remove(&mut self, entity: &EntityRef<T>) -> CoreResult<()> {
        let record = match self.visible.remove(entity.handle()) {
            Some(record) => record,
            None => return Err(CoreError::not_found(self.name(), entity.read().id())),
        };
        self.staging.stage_remove(record);
        Ok(())
    }

    /// Swaps the visible entity with the same identifier for `entity`.
    /// Returns the displaced entity.
    pub(crate) fn replace(&mut self, entity: &EntityRef<T>) -> CoreResult<EntityRef<T>> {
        let old = self.visible.replace(entity.clone())?;
        let displaced = old.entity().clone();
        if !displaced.same_entity(entity) {
            self.staging.stage_replace(old, entity);
        }
        Ok(displaced)
    }

    pub(crate) fn get_by_id(&self, id: &T::Id) -> Option<&EntityRef<T>> {
        self.visible.get_by_id(id)
    }

    pub(crate) fn get_by_slug(&self, slug: &str) -> Option<&EntityRef<T>> {
        self.visible.get_by_slug(slug)
    }

    pub(crate) fn contains(&self, entity: &EntityRef<T>) -> bool {
        self.visible.contains(entity.handle())
    }

    pub(crate) fn len(&self) -> usize {
        self.visible.len()
    }

    pub(crate) fn entities(&self) -> impl Iterator<Item = &EntityRef<T>> + '_ {
        self.visible.entities()
    }
}

/// Type-erased view of a [`TrackedSet`], used by commit.
pub(crate) trait ErasedTrackedSet: Send {
    fn entity_type(&self) -> EntityType;

    /// Full consistency check; rebuilds the indices from current values.
    fn validate(&mut self) -> CoreResult<()>;

    /// Builds the flush for the staged changes, if there are any.
    fn flush(&self, repository: &Repository) -> Option<Box<dyn PendingFlush>>;

    fn mark_committed(&mut self);

    fn summary(&self) -> StagingSummary;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Entity> ErasedTrackedSet for TrackedSet<T> {
    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    fn validate(&mut self) -> CoreResult<()> {
        self.staging.validate_removals()?;
        self.visible.rebuild()
    }

    fn flush(&self, repository: &Repository) -> Option<Box<dyn PendingFlush>> {
        let changes = self.staging.changes(&self.visible);
        if changes.is_empty() {
            None
        } else {
            Some(repository.flush(changes))
        }
    }

    fn mark_committed(&mut self) {
        self.staging.mark_committed(&self.visible);
    }

    fn summary(&self) -> StagingSummary {
        self.staging.summary()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
