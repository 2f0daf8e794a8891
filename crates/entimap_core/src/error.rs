//! Error types for entimap core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Message carried by [`CoreError::InvalidState`] when an entity reaches a
/// commit without an identifier.
pub const MISSING_ID_MESSAGE: &str = "Entity ID must not be None";

/// Errors that can occur in entimap core operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Another visible entity of the same type already uses this identifier.
    #[error("duplicate entity ID \"{id}\" for {entity_type}")]
    DuplicateIdentifier {
        /// Name of the entity type.
        entity_type: &'static str,
        /// The conflicting identifier, rendered for display.
        id: String,
    },

    /// Another visible entity of the same type already uses this slug.
    #[error("duplicate entity slug \"{slug}\" for {entity_type}")]
    DuplicateSlug {
        /// Name of the entity type.
        entity_type: &'static str,
        /// The conflicting slug.
        slug: String,
    },

    /// The tracked state cannot be committed as is.
    #[error("{message}")]
    InvalidState {
        /// Description of the inconsistency.
        message: String,
    },

    /// The targeted entity is not tracked by the session.
    #[error("entity not found: {} in {entity_type}", .id.as_deref().unwrap_or("<no id>"))]
    NotFound {
        /// Name of the entity type.
        entity_type: &'static str,
        /// The identifier that was looked up, if the entity had one.
        id: Option<String>,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a duplicate identifier error.
    pub fn duplicate_identifier(entity_type: &'static str, id: impl ToString) -> Self {
        Self::DuplicateIdentifier {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Creates a duplicate slug error.
    pub fn duplicate_slug(entity_type: &'static str, slug: impl Into<String>) -> Self {
        Self::DuplicateSlug {
            entity_type,
            slug: slug.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates the invalid state error for an entity without an ID.
    pub fn missing_id() -> Self {
        Self::invalid_state(MISSING_ID_MESSAGE)
    }

    /// Creates a not found error.
    pub fn not_found(entity_type: &'static str, id: Option<impl ToString>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.map(|id| id.to_string()),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns `true` for the two uniqueness violations.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::DuplicateIdentifier { .. } | Self::DuplicateSlug { .. }
        )
    }
}
