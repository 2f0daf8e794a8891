//! Entity and key traits.

use std::fmt;
use std::hash::Hash;

/// A value that can identify an entity.
///
/// Keys must be hashable (identity map) and totally ordered (generated
/// identifiers compare in creation order).
pub trait EntityKey: Clone + Eq + Hash + Ord + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Converts a value produced by an [`IdGenerator`](crate::IdGenerator)
    /// into a key. Must preserve ordering.
    fn from_generated(value: u64) -> Self;
}

impl EntityKey for u64 {
    fn from_generated(value: u64) -> Self {
        value
    }
}

impl EntityKey for i64 {
    fn from_generated(value: u64) -> Self {
        i64::try_from(value).unwrap_or(i64::MAX)
    }
}

impl EntityKey for String {
    /// Zero-padded so that lexicographic order matches generation order.
    fn from_generated(value: u64) -> Self {
        format!("{value:020}")
    }
}

/// Trait for types that can be tracked by a session.
///
/// The session only ever interprets the identifier and the slug; every
/// other field belongs to the caller.
///
/// `Clone` is used to hand private copies of committed entities to each
/// session, `PartialEq` to detect which loaded entities were modified.
///
/// # Example
///
/// ```rust
/// use entimap_core::Entity;
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Tag {
///     id: Option<u64>,
///     label: String,
/// }
///
/// impl Entity for Tag {
///     type Id = u64;
///
///     fn id(&self) -> Option<u64> {
///         self.id
///     }
///
///     fn set_id(&mut self, id: Option<u64>) {
///         self.id = id;
///     }
///
///     fn slug(&self) -> Option<String> {
///         Some(self.label.to_lowercase())
///     }
/// }
/// ```
pub trait Entity: Clone + PartialEq + Send + Sync + 'static {
    /// Identifier type.
    type Id: EntityKey;

    /// Returns the identifier, if one has been assigned.
    fn id(&self) -> Option<Self::Id>;

    /// Sets or clears the identifier.
    fn set_id(&mut self, id: Option<Self::Id>);

    /// Returns the human-readable secondary key, if any.
    ///
    /// May be derived from other fields, including the identifier.
    fn slug(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_keys_sort_in_generation_order() {
        let earlier = String::from_generated(9);
        let later = String::from_generated(10);
        assert!(earlier < later);
    }

    #[test]
    fn signed_keys_saturate() {
        assert_eq!(i64::from_generated(7), 7);
        assert_eq!(i64::from_generated(u64::MAX), i64::MAX);
    }
}
