//! # BoxDB Engine
//!
//! Embedded transactional engine behind BoxDB.
//!
//! This crate provides:
//! - A single append-only data file per store directory, guarded by a lock file
//! - Committed snapshots: readers never block the writer and vice versa
//! - Bounded reader slots that fail fast and a single blocking writer slot
//! - Query plans evaluated against raw records
//! - Standalone relation tables
//! - Numeric status codes for every error
//!
//! The typed layer in `boxdb_core` is the intended user; this API deals in
//! entity ids, record ids and encoded records.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dir;
mod engine;
mod error;
mod frame;
mod model;
mod options;
mod query;
mod slots;
mod state;
mod txn;

pub use engine::Engine;
pub use error::{code, EngineError, EngineResult, MAX_READERS_MESSAGE};
pub use model::{Model, ModelEntity, ModelProperty, ModelRelation};
pub use options::{EngineOptions, DEFAULT_MAX_READERS, DEFAULT_MAX_SIZE_KB};
pub use query::{PlanCondition, QueryPlan, TextOp};
pub use txn::{Txn, TxnMode, TxnState};
