//! Test fixtures and repository helpers.
//!
//! Provides sample entity types and convenience functions for setting up
//! repositories and sessions.

use entimap_core::{AmbientTransaction, Entity, Repository, RepositoryConfig, Session};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// A note keyed by a numeric id with an optional slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    /// Identifier, assigned on first add if missing.
    pub id: Option<u64>,
    /// Optional unique slug.
    pub slug: Option<String>,
    /// Free text.
    pub title: String,
}

impl Note {
    /// Creates a note without id or slug.
    pub fn titled(title: &str) -> Self {
        Self {
            id: None,
            slug: None,
            title: title.to_string(),
        }
    }

    /// Creates a note with a slug.
    pub fn with_slug(slug: &str) -> Self {
        Self {
            id: None,
            slug: Some(slug.to_string()),
            title: slug.to_string(),
        }
    }

    /// Creates a note with a preset id.
    pub fn with_id(id: u64) -> Self {
        Self {
            id: Some(id),
            slug: None,
            title: String::new(),
        }
    }
}

impl Entity for Note {
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

/// A member whose slug is its handle, or its id when it has no handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Identifier.
    pub id: Option<u64>,
    /// Optional public handle.
    pub handle: Option<String>,
    /// Display name.
    pub name: String,
}

impl Member {
    /// Creates a member without id or handle.
    pub fn named(name: &str) -> Self {
        Self {
            id: None,
            handle: None,
            name: name.to_string(),
        }
    }
}

impl Entity for Member {
    type Id = u64;

    fn id(&self) -> Option<u64> {
        self.id
    }

    fn set_id(&mut self, id: Option<u64>) {
        self.id = id;
    }

    fn slug(&self) -> Option<String> {
        self.handle
            .clone()
            .or_else(|| self.id.map(|id| id.to_string()))
    }
}

/// A label keyed by a string id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    /// String identifier; generated ids are zero-padded numbers.
    pub id: Option<String>,
    /// Text shown to users, doubles as the slug.
    pub text: String,
}

impl Label {
    /// Creates a label without id.
    pub fn new(text: &str) -> Self {
        Self {
            id: None,
            text: text.to_string(),
        }
    }
}

impl Entity for Label {
    type Id = String;

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn slug(&self) -> Option<String> {
        Some(self.text.clone())
    }
}

/// Installs a `tracing` subscriber for tests.
///
/// Honors `RUST_LOG`, defaults to `warn`. Safe to call from every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Runs a test with a fresh in-memory repository.
///
/// # Example
///
/// ```rust,ignore
/// use entimap_testkit::with_repository;
///
/// #[test]
/// fn my_test() {
///     with_repository(|repo| {
///         let mut session = repo.session();
///         // ... test operations
///     });
/// }
/// ```
pub fn with_repository<F, R>(f: F) -> R
where
    F: FnOnce(&Repository) -> R,
{
    init_tracing();
    let repo = Repository::in_memory();
    f(&repo)
}

/// Runs a test with a session on a fresh in-memory repository.
pub fn with_session<F, R>(f: F) -> R
where
    F: FnOnce(&mut Session) -> R,
{
    with_repository(|repo| {
        let mut session = repo.session();
        f(&mut session)
    })
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a repository with `count` committed notes slugged
    /// `note-0`, `note-1`, ...
    pub fn seeded_notes(count: usize) -> Repository {
        init_tracing();
        let repo = Repository::in_memory();
        repo.seed((0..count).map(|i| Note::with_slug(&format!("note-{i}"))))
            .expect("Failed to seed notes");
        repo
    }

    /// Creates two repositories whose sessions join one ambient
    /// transaction.
    pub fn joined_pair() -> (Repository, Repository, AmbientTransaction) {
        init_tracing();
        let txn = AmbientTransaction::new();
        let left = Repository::open_in(RepositoryConfig::new().name("left"), txn.clone());
        let right = Repository::open_in(RepositoryConfig::new().name("right"), txn.clone());
        (left, right, txn)
    }
}
