//! In-memory repository.

use crate::config::RepositoryConfig;
use crate::entity::{generator_for, Entity, EntityKey, IdGenerator};
use crate::error::{CoreError, CoreResult};
use crate::repository::store::{ChangeSet, EntityStore, StoreMap};
use crate::session::Session;
use crate::transaction::{AmbientTransaction, Autonomous, CommitBoundary, PendingFlush};
use crate::types::EntityType;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

struct RepositoryInner {
    config: RepositoryConfig,
    ids: Arc<dyn IdGenerator>,
    stores: RwLock<StoreMap>,
    transaction: Option<AmbientTransaction>,
}

/// Shared in-memory backing store and session factory.
///
/// A repository keeps the committed entities of every entity type and
/// hands out [`Session`]s over them. Every session loads private copies of
/// the committed entities it touches; what it commits becomes visible to
/// sessions opened afterwards.
///
/// Whether a session commit is applied immediately or enlisted in an
/// [`AmbientTransaction`] is decided once, by the `join_transaction` flag
/// of the configuration.
///
/// Cloning yields another handle to the same repository.
///
/// # Example
///
/// ```rust,ignore
/// let repo = Repository::open(RepositoryConfig::new().name("notes"));
///
/// let mut session = repo.session();
/// let note = session.insert(Note::new("hello"))?;
/// session.commit()?;
///
/// assert_eq!(repo.count::<Note>(), 1);
/// ```
#[derive(Clone)]
pub struct Repository {
    inner: Arc<RepositoryInner>,
}

impl Repository {
    /// Opens a repository.
    ///
    /// With `join_transaction` set, the repository creates its own
    /// ambient transaction; see [`open_in`](Self::open_in) to share one.
    pub fn open(config: RepositoryConfig) -> Self {
        let ids = generator_for(config.id_strategy);
        let transaction = config.join_transaction.then(AmbientTransaction::new);
        Self::build(config, ids, transaction)
    }

    /// Opens a repository with default configuration.
    pub fn in_memory() -> Self {
        Self::open(RepositoryConfig::default())
    }

    /// Opens a repository that draws identifiers from `ids` instead of the
    /// configured strategy.
    pub fn open_with_generator(config: RepositoryConfig, ids: Arc<dyn IdGenerator>) -> Self {
        let transaction = config.join_transaction.then(AmbientTransaction::new);
        Self::build(config, ids, transaction)
    }

    /// Opens a repository whose sessions join `transaction`.
    ///
    /// Implies `join_transaction`.
    pub fn open_in(config: RepositoryConfig, transaction: AmbientTransaction) -> Self {
        let config = config.join_transaction(true);
        let ids = generator_for(config.id_strategy);
        Self::build(config, ids, Some(transaction))
    }

    fn build(
        config: RepositoryConfig,
        ids: Arc<dyn IdGenerator>,
        transaction: Option<AmbientTransaction>,
    ) -> Self {
        info!(
            name = %config.name,
            join_transaction = config.join_transaction,
            autocommit = config.autocommit,
            "opening repository"
        );
        Self {
            inner: Arc::new(RepositoryInner {
                config,
                ids,
                stores: RwLock::new(StoreMap::default()),
                transaction,
            }),
        }
    }

    /// Returns the repository name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RepositoryConfig {
        &self.inner.config
    }

    /// Returns the identifier generator.
    pub fn id_generator(&self) -> &Arc<dyn IdGenerator> {
        &self.inner.ids
    }

    /// Returns the ambient transaction sessions join, if any.
    pub fn ambient_transaction(&self) -> Option<&AmbientTransaction> {
        self.inner.transaction.as_ref()
    }

    /// Opens a new session.
    pub fn session(&self) -> Session {
        let boundary: Arc<dyn CommitBoundary> = match &self.inner.transaction {
            Some(transaction) => Arc::new(transaction.clone()),
            None => Arc::new(Autonomous),
        };
        Session::new(self.clone(), boundary)
    }

    /// Loads initial entities of type `T` into the committed store.
    ///
    /// Entities without an identifier get one from the generator. Either
    /// all entities are stored or, on a conflict, none are. Returns the
    /// number of entities stored.
    pub fn seed<T, I>(&self, entities: I) -> CoreResult<usize>
    where
        T: Entity,
        I: IntoIterator<Item = T>,
    {
        let mut changes = ChangeSet::new();
        for mut entity in entities {
            if entity.id().is_none() {
                entity.set_id(Some(T::Id::from_generated(self.inner.ids.next_id())));
            }
            changes.upsert(None, entity);
        }
        let count = changes.len();
        self.apply(changes)?;
        debug!(
            repository = %self.name(),
            entity_type = %EntityType::of::<T>(),
            count,
            "seeded entities"
        );
        Ok(count)
    }

    /// Returns the number of committed entities of type `T`.
    pub fn count<T: Entity>(&self) -> usize {
        self.inner.stores.read().get::<T>().map_or(0, EntityStore::len)
    }

    /// Returns a copy of the committed entity with the identifier.
    pub fn get_by_id<T: Entity>(&self, id: &T::Id) -> Option<T> {
        self.inner.stores.read().get::<T>()?.get_by_id(id)
    }

    /// Returns a copy of the committed entity with the slug.
    pub fn get_by_slug<T: Entity>(&self, slug: &str) -> Option<T> {
        self.inner.stores.read().get::<T>()?.get_by_slug(slug)
    }

    /// Returns copies of all committed entities of type `T`.
    pub fn entities<T: Entity>(&self) -> Vec<T> {
        self.snapshot::<T>()
    }

    /// Returns the number of change sets applied to the store of `T`.
    pub fn version<T: Entity>(&self) -> u64 {
        self.inner.stores.read().get::<T>().map_or(0, EntityStore::version)
    }

    /// Returns the number of entity types with a committed store.
    pub fn entity_type_count(&self) -> usize {
        self.inner.stores.read().len()
    }

    pub(crate) fn snapshot<T: Entity>(&self) -> Vec<T> {
        self.inner
            .stores
            .read()
            .get::<T>()
            .map(EntityStore::snapshot)
            .unwrap_or_default()
    }

    pub(crate) fn apply<T: Entity>(&self, changes: ChangeSet<T>) -> CoreResult<()> {
        self.inner.stores.write().get_or_init::<T>().apply(changes)
    }

    /// Wraps a change set into a flush against this repository.
    ///
    /// The flush does not keep the repository alive: an ambient
    /// transaction holding it is itself owned by the repository.
    pub(crate) fn flush<T: Entity>(&self, changes: ChangeSet<T>) -> Box<dyn PendingFlush> {
        Box::new(StoreFlush {
            repository: Arc::downgrade(&self.inner),
            changes,
        })
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("name", &self.name())
            .field("join_transaction", &self.inner.config.join_transaction)
            .field("entity_types", &self.entity_type_count())
            .finish_non_exhaustive()
    }
}

/// Change set bound to the repository it will be applied to.
struct StoreFlush<T: Entity> {
    repository: Weak<RepositoryInner>,
    changes: ChangeSet<T>,
}

impl<T: Entity> PendingFlush for StoreFlush<T> {
    fn entity_type(&self) -> EntityType {
        EntityType::of::<T>()
    }

    fn write_count(&self) -> usize {
        self.changes.len()
    }

    fn apply(self: Box<Self>) -> CoreResult<()> {
        let Self {
            repository,
            changes,
        } = *self;
        let inner = repository.upgrade().ok_or_else(|| {
            CoreError::invalid_operation("repository dropped before its changes were applied")
        })?;
        Repository { inner }.apply(changes)
    }
}
