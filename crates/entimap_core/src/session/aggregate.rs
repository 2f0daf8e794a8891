//! Typed view of a session.

use crate::entity::{Entity, EntityRef};
use crate::error::CoreResult;
use crate::session::staging::StagingSummary;
use crate::session::unit_of_work::Session;
use std::marker::PhantomData;

/// The entities of one type inside a [`Session`].
///
/// `Aggregate<T>` fixes the entity type once so that call sites do not
/// need turbofish annotations. All operations go through the session and
/// share its identity map and staging.
///
/// ```rust,ignore
/// let mut notes = session.aggregate::<Note>();
/// let note = notes.insert(Note::titled("todo"))?;
/// let drafts: Vec<_> = notes
///     .iter()
///     .filter(|n| n.read().title.starts_with("draft"))
///     .cloned()
///     .collect();
/// notes.commit()?;
/// ```
pub struct Aggregate<'s, T: Entity> {
    session: &'s mut Session,
    _marker: PhantomData<T>,
}

impl<'s, T: Entity> Aggregate<'s, T> {
    pub(crate) fn new(session: &'s mut Session) -> Self {
        Self {
            session,
            _marker: PhantomData,
        }
    }

    /// See [`Session::add`].
    pub fn add(&mut self, entity: &EntityRef<T>) -> CoreResult<()> {
        self.session.add(entity)
    }

    /// See [`Session::insert`].
    pub fn insert(&mut self, value: T) -> CoreResult<EntityRef<T>> {
        self.session.insert(value)
    }

    /// See [`Session::remove`].
    pub fn remove(&mut self, entity: &EntityRef<T>) -> CoreResult<()> {
        self.session.remove(entity)
    }

    /// See [`Session::replace`].
    pub fn replace(&mut self, entity: &EntityRef<T>) -> CoreResult<EntityRef<T>> {
        self.session.replace(entity)
    }

    /// Looks up an entity by identifier.
    pub fn get_by_id(&mut self, id: &T::Id) -> Option<EntityRef<T>> {
        self.session.get_by_id::<T>(id)
    }

    /// Looks up an entity by slug.
    pub fn get_by_slug(&mut self, slug: &str) -> Option<EntityRef<T>> {
        self.session.get_by_slug::<T>(slug)
    }

    /// Iterates over the visible entities in insertion order.
    pub fn iter(&mut self) -> impl Iterator<Item = &EntityRef<T>> + '_ {
        self.session.iter::<T>()
    }

    /// Returns all visible entities.
    pub fn get_all(&mut self) -> Vec<EntityRef<T>> {
        self.session.get_all::<T>()
    }

    /// Returns the number of visible entities.
    pub fn count(&mut self) -> usize {
        self.session.len::<T>()
    }

    /// Checks whether this very instance is visible.
    pub fn contains(&mut self, entity: &EntityRef<T>) -> bool {
        self.session.contains(entity)
    }

    /// Returns what is staged for `T`.
    pub fn staging(&mut self) -> StagingSummary {
        self.session.staging::<T>()
    }

    /// Commits the whole session, not only entities of type `T`.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.session.commit()
    }
}

#[cfg(test)]
mod tests {
    use crate::entity::Entity;
    use crate::error::CoreError;
    use crate::repository::Repository;

    #[derive(Debug, Clone, PartialEq)]
    struct Label {
        id: Option<u64>,
        name: String,
    }

    impl Entity for Label {
        type Id = u64;

        fn id(&self) -> Option<u64> {
            self.id
        }

        fn set_id(&mut self, id: Option<u64>) {
            self.id = id;
        }

        fn slug(&self) -> Option<String> {
            Some(self.name.to_lowercase())
        }
    }

    fn label(name: &str) -> Label {
        Label {
            id: None,
            name: name.to_string(),
        }
    }

    #[test]
    fn aggregate_filters_with_iterators() {
        let repo = Repository::in_memory();
        let mut session = repo.session();
        let mut labels = session.aggregate::<Label>();

        labels.insert(label("Bug")).unwrap();
        labels.insert(label("Feature")).unwrap();
        labels.insert(label("Backlog")).unwrap();

        let with_b: Vec<String> = labels
            .iter()
            .filter(|l| l.read().name.starts_with('B'))
            .map(|l| l.read().name.clone())
            .collect();
        assert_eq!(with_b, vec!["Bug".to_string(), "Backlog".to_string()]);
        assert_eq!(labels.count(), 3);
        assert_eq!(labels.staging().added, 3);

        labels.commit().unwrap();
        assert_eq!(repo.count::<Label>(), 3);
    }

    #[test]
    fn aggregate_shares_session_state() {
        let repo = Repository::in_memory();
        let mut session = repo.session();
        let bug = session.insert(label("Bug")).unwrap();

        let mut labels = session.aggregate::<Label>();
        assert!(labels.contains(&bug));
        assert!(labels.get_by_slug("bug").unwrap().same_entity(&bug));
        assert!(matches!(
            labels.insert(label("BUG")),
            Err(CoreError::DuplicateSlug { .. })
        ));

        labels.remove(&bug).unwrap();
        assert!(labels.get_all().is_empty());
    }
}
