//! Staged session changes.

use crate::entity::{Entity, EntityHandle, EntityRef};
use crate::error::{CoreError, CoreResult};
use crate::index::{EntityRecord, IdentityIndex};
use crate::repository::ChangeSet;
use std::collections::HashMap;

/// Counts of the changes a session has staged for one entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingSummary {
    /// Entities added since the last commit.
    pub added: usize,
    /// Committed entities removed since the last commit.
    pub removed: usize,
    /// Replacements since the last commit.
    pub replaced: usize,
}

impl StagingSummary {
    /// Returns `true` if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.replaced == 0
    }
}

/// State of an entity as last loaded from or committed to the repository.
#[derive(Debug, Clone)]
struct Baseline<T: Entity> {
    /// Key the entity is stored under in the repository.
    key: T::Id,
    /// Field values at that point.
    state: T,
}

/// A committed entity the session has let go of.
#[derive(Debug)]
struct Removal<T: Entity> {
    entity: EntityRef<T>,
    baseline: Baseline<T>,
}

/// Pending additions, removals and replacements of one entity type.
///
/// Entities known to the repository carry a baseline. Everything visible
/// without a baseline was added in this session; every removal with a
/// baseline turns into a delete at commit time.
#[derive(Debug)]
pub(crate) struct StagingArea<T: Entity> {
    added: Vec<EntityHandle>,
    removed: Vec<Removal<T>>,
    replaced: Vec<(EntityRef<T>, EntityHandle)>,
    baseline: HashMap<EntityHandle, Baseline<T>>,
}

impl<T: Entity> StagingArea<T> {
    pub(crate) fn new() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            replaced: Vec::new(),
            baseline: HashMap::new(),
        }
    }

    /// Records an entity loaded from the repository.
    pub(crate) fn track_loaded(&mut self, entity: &EntityRef<T>) {
        let state = entity.snapshot();
        if let Some(key) = state.id() {
            self.baseline.insert(entity.handle(), Baseline { key, state });
        }
    }

    /// Records an addition. Re-adding a removed committed entity cancels
    /// its removal.
    pub(crate) fn stage_add(&mut self, entity: &EntityRef<T>) {
        let handle = entity.handle();
        if let Some(pos) = self.removed.iter().position(|r| r.entity.handle() == handle) {
            let removal = self.removed.remove(pos);
            self.baseline.insert(handle, removal.baseline);
        } else {
            self.added.push(handle);
        }
    }

    /// Records a removal.
    pub(crate) fn stage_remove(&mut self, record: EntityRecord<T>) {
        let handle = record.handle();
        if let Some(pos) = self.added.iter().position(|h| *h == handle) {
            self.added.remove(pos);
        } else if let Some(baseline) = self.baseline.remove(&handle) {
            self.removed.push(Removal {
                entity: record.into_entity(),
                baseline,
            });
        }
    }

    /// Records that `old` was swapped out for `new`.
    pub(crate) fn stage_replace(&mut self, old: EntityRecord<T>, new: &EntityRef<T>) {
        let old_handle = old.handle();
        let new_handle = new.handle();
        for slot in self.added.iter_mut().filter(|h| **h == old_handle) {
            *slot = new_handle;
        }
        if let Some(baseline) = self.baseline.remove(&old_handle) {
            self.baseline.insert(new_handle, baseline);
        }
        self.replaced.push((old.into_entity(), new_handle));
    }

    /// Checks that every staged removal can still be resolved.
    pub(crate) fn validate_removals(&self) -> CoreResult<()> {
        for removal in &self.removed {
            if removal.entity.read().id().is_none() {
                return Err(CoreError::missing_id());
            }
        }
        Ok(())
    }

    /// Computes the writes needed to bring the repository in line with the
    /// visible set. Unmodified entities are skipped.
    pub(crate) fn changes(&self, visible: &IdentityIndex<T>) -> ChangeSet<T> {
        let mut changes = ChangeSet::new();
        for removal in &self.removed {
            changes.delete(removal.baseline.key.clone());
        }
        for record in visible.iter() {
            let current = record.entity().snapshot();
            match self.baseline.get(&record.handle()) {
                Some(baseline) if baseline.state == current => {}
                Some(baseline) => changes.upsert(Some(baseline.key.clone()), current),
                None => changes.upsert(None, current),
            }
        }
        changes
    }

    /// Makes the visible set the new baseline and forgets all staged work.
    pub(crate) fn mark_committed(&mut self, visible: &IdentityIndex<T>) {
        self.added.clear();
        self.removed.clear();
        self.replaced.clear();
        self.baseline.clear();
        for record in visible.iter() {
            self.track_loaded(record.entity());
        }
    }

    pub(crate) fn summary(&self) -> StagingSummary {
        StagingSummary {
            added: self.added.len(),
            removed: self.removed.len(),
            replaced: self.replaced.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: Option<u64>,
        value: i32,
    }

    impl Entity for Row {
        type Id = u64;

        fn id(&self) -> Option<u64> {
            self.id
        }

        fn set_id(&mut self, id: Option<u64>) {
            self.id = id;
        }

        fn slug(&self) -> Option<String> {
            None
        }
    }

    fn row(id: u64, value: i32) -> EntityRef<Row> {
        EntityRef::new(Row {
            id: Some(id),
            value,
        })
    }

    /// A visible set with one loaded entity.
    fn loaded() -> (IdentityIndex<Row>, StagingArea<Row>, EntityRef<Row>) {
        let mut index = IdentityIndex::new();
        let mut staging = StagingArea::new();
        let entity = row(1, 10);
        index.insert(entity.clone()).unwrap();
        staging.track_loaded(&entity);
        (index, staging, entity)
    }

    #[test]
    fn unmodified_loaded_entities_are_not_written() {
        let (index, staging, _) = loaded();
        assert!(staging.changes(&index).is_empty());
        assert!(staging.summary().is_empty());
    }

    #[test]
    fn modified_loaded_entity_is_upserted() {
        let (index, staging, entity) = loaded();
        entity.write().value = 11;

        let changes = staging.changes(&index);
        assert_eq!(changes.upserts().len(), 1);
        assert_eq!(changes.upserts()[0].previous, Some(1));
        assert_eq!(changes.upserts()[0].value.value, 11);
    }

    #[test]
    fn added_then_removed_leaves_nothing() {
        let (mut index, mut staging, _) = loaded();
        let fresh = row(2, 20);
        index.insert(fresh.clone()).unwrap();
        staging.stage_add(&fresh);
        assert_eq!(staging.summary().added, 1);

        let record = index.remove(fresh.handle()).unwrap();
        staging.stage_remove(record);
        assert!(staging.summary().is_empty());
        assert!(staging.changes(&index).is_empty());
    }

    #[test]
    fn removed_loaded_entity_is_deleted() {
        let (mut index, mut staging, entity) = loaded();
        let record = index.remove(entity.handle()).unwrap();
        staging.stage_remove(record);

        let changes = staging.changes(&index);
        assert_eq!(changes.deletes(), &[1]);
        assert_eq!(staging.summary().removed, 1);
    }

    #[test]
    fn removal_without_id_fails_validation() {
        let (mut index, mut staging, entity) = loaded();
        let record = index.remove(entity.handle()).unwrap();
        staging.stage_remove(record);
        entity.write().id = None;

        assert_eq!(staging.validate_removals(), Err(CoreError::missing_id()));
    }

    #[test]
    fn re_add_cancels_removal() {
        let (mut index, mut staging, entity) = loaded();
        let record = index.remove(entity.handle()).unwrap();
        staging.stage_remove(record);

        index.insert(entity.clone()).unwrap();
        staging.stage_add(&entity);
        assert!(staging.summary().is_empty());
        assert!(staging.changes(&index).is_empty());
    }

    #[test]
    fn replacement_inherits_baseline() {
        let (mut index, mut staging, _) = loaded();
        let replacement = row(1, 99);
        let old = index.replace(replacement.clone()).unwrap();
        staging.stage_replace(old, &replacement);

        let changes = staging.changes(&index);
        assert_eq!(changes.upserts().len(), 1);
        assert_eq!(changes.upserts()[0].previous, Some(1));
        assert_eq!(staging.summary().replaced, 1);
    }

    #[test]
    fn mark_committed_resets() {
        let (mut index, mut staging, entity) = loaded();
        let fresh = row(2, 20);
        index.insert(fresh.clone()).unwrap();
        staging.stage_add(&fresh);
        entity.write().value = 12;

        staging.mark_committed(&index);
        assert!(staging.summary().is_empty());
        assert!(staging.changes(&index).is_empty());
    }
}
