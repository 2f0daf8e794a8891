//! Shared entity handles.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

/// Stable identity of one entity instance.
///
/// Two handles are equal only if they belong to the same instance, no
/// matter what the instances' fields contain. A handle is meaningful only
/// while some [`EntityRef`] to the instance is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityHandle(usize);

/// Shared, owning reference to an entity.
///
/// The caller and the session both hold an `EntityRef` to the same
/// instance: the caller mutates fields through [`write`](Self::write), the
/// session re-reads the identifier and slug when it needs them. Cloning an
/// `EntityRef` clones the reference, not the entity.
///
/// Do not hold a write guard across a session call on the same entity; the
/// lock is not reentrant.
pub struct EntityRef<T> {
    inner: Arc<RwLock<T>>,
}

impl<T> EntityRef<T> {
    /// Wraps a value in a new shared reference.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
        }
    }

    /// Locks the entity for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    /// Locks the entity for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }

    /// Returns the identity handle of the referenced instance.
    #[must_use]
    pub fn handle(&self) -> EntityHandle {
        EntityHandle(Arc::as_ptr(&self.inner) as *const () as usize)
    }

    /// Checks whether both references point at the same instance.
    #[must_use]
    pub fn same_entity(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the number of live references to the instance.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<T: Clone> EntityRef<T> {
    /// Returns a copy of the entity's current state.
    #[must_use]
    pub fn snapshot(&self) -> T {
        self.read().clone()
    }
}

impl<T> Clone for EntityRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for EntityRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityRef").field(&*self.read()).finish()
    }
}
