//! Entity identifier.

use crate::entity::EntityKey;
use std::fmt;

/// Numeric identifier for an entity.
///
/// A ready-made [`EntityKey`] for entity types that have no identifier type
/// of their own. Generated values are:
/// - Unique within a repository
/// - Ordered by creation time
/// - Never reused
///
/// Zero is an ordinary identifier, distinct from "no identifier".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates an entity ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl EntityKey for EntityId {
    fn from_generated(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<EntityId> for u64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_a_valid_id() {
        let id = EntityId::new(0);
        assert_eq!(id.as_u64(), 0);
        assert_eq!(Some(id), Some(EntityId::from(0)));
    }

    #[test]
    fn ordering() {
        let id1 = EntityId::new(1);
        let id2 = EntityId::new(2);
        assert!(id1 < id2);
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", EntityId::new(42)), "42");
    }
}
