//! Property-based test generators using proptest.
//!
//! Provides strategies for generating sample entities and session
//! operation sequences.

use crate::fixtures::Note;
use proptest::prelude::*;

/// Strategy for generating slugs.
pub fn slug_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,11}").expect("Invalid regex")
}

/// Strategy for generating notes without an id.
pub fn note_strategy() -> impl Strategy<Value = Note> {
    (prop::option::of(slug_strategy()), "[ -~]{0,24}").prop_map(|(slug, title)| Note {
        id: None,
        slug,
        title,
    })
}

/// Strategy for generating notes with pairwise distinct slugs.
pub fn distinct_notes_strategy(
    min: usize,
    max: usize,
) -> impl Strategy<Value = Vec<Note>> {
    prop::collection::hash_set(slug_strategy(), min..max).prop_map(|slugs| {
        let mut slugs: Vec<String> = slugs.into_iter().collect();
        slugs.sort();
        slugs.iter().map(|slug| Note::with_slug(slug)).collect()
    })
}

/// A step applied to a session in model-based tests.
#[derive(Debug, Clone)]
pub enum SessionOperation {
    /// Add a new note
    Add {
        /// Slug of the note
        slug: Option<String>,
    },
    /// Remove a visible note
    Remove {
        /// Position among visible notes, taken modulo their count
        index: usize,
    },
    /// Replace a visible note with a fresh instance
    Replace {
        /// Position among visible notes, taken modulo their count
        index: usize,
        /// Title of the replacement
        title: String,
    },
    /// Commit the session
    Commit,
    /// Roll the session back
    Rollback,
}

/// Strategy for generating session operations.
///
/// Slugs come from a small pool so that collisions happen.
pub fn session_operation_strategy() -> impl Strategy<Value = SessionOperation> {
    prop_oneof![
        4 => prop::option::of("[a-e]").prop_map(|slug| SessionOperation::Add { slug }),
        2 => any::<usize>().prop_map(|index| SessionOperation::Remove { index }),
        1 => (any::<usize>(), "[a-z]{1,8}")
            .prop_map(|(index, title)| SessionOperation::Replace { index, title }),
        2 => Just(SessionOperation::Commit),
        1 => Just(SessionOperation::Rollback),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<SessionOperation>> {
    prop::collection::vec(session_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
