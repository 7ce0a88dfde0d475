//! # BoxDB Testkit
//!
//! Test utilities for BoxDB.
//!
//! This crate provides:
//! - Fixture entities with hand-written bindings
//! - In-memory and temporary-directory test stores
//! - Property-based test generators using proptest
//! - Helpers for running concurrent workers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use boxdb_testkit::prelude::*;
//!
//! #[test]
//! fn put_and_get() {
//!     let store = TestStore::memory();
//!     let notes = store.box_for::<Note>().unwrap();
//!     let id = notes.put(&mut Note::new("hello")).unwrap();
//!     assert!(notes.get(id).unwrap().is_some());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod entities;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::entities::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use entities::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
