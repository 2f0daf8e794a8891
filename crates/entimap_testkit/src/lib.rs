//! # EntiMap Testkit
//!
//! Test utilities for EntiMap.
//!
//! This crate provides:
//! - Sample entity types and repository helpers
//! - Property-based test generators using proptest
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entimap_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_session() {
//!     with_session(|session| {
//!         let note = session.insert(Note::titled("hello")).unwrap();
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
