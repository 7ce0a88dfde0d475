//! # BoxDB Core
//!
//! Typed object mapping over the BoxDB engine.
//!
//! This crate provides:
//! - Entity bindings with static schema descriptors
//! - The typed codec between entity fields and engine records
//! - Boxes for put, get, remove, count and lazy iteration
//! - Queries built from typed property conditions and run by the engine
//! - To-one and to-many relation proxies
//! - Scoped and explicit read and write transactions
//! - One error taxonomy for every engine status
//!
//! ```rust,ignore
//! use boxdb_core::{Model, Store, StoreConfig};
//!
//! let model = Model::builder().entity::<Note>().entity::<Author>().build()?;
//! let store = Store::open(StoreConfig::new("notes-db"), model)?;
//!
//! let notes = store.box_for::<Note>()?;
//! let found = notes
//!     .query()
//!     .filter(note::TEXT.contains("writing"))
//!     .build()?
//!     .find()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod config;
mod entity;
mod entity_box;
mod error;
mod id;
mod query;
mod relation;
mod schema;
mod store;
mod transaction;

pub use boxdb_codec::{PropertyFlags, PropertyType, PLATFORM_INT};
pub use boxdb_engine::{TxnMode, TxnState};
pub use codec::{EntityReader, EntityWriter, FieldValue};
pub use config::{StoreConfig, DEFAULT_DIRECTORY};
pub use entity::Entity;
pub use entity_box::{BoxIter, EntityBox};
pub use error::{BoxError, BoxResult};
pub use id::Id;
pub use query::{Condition, Ordered, Property, Query, QueryBuilder};
pub use relation::{ToMany, ToOne};
pub use schema::{EntityDescriptor, Model, ModelBuilder, PropertyDescriptor, RelationDescriptor};
pub use store::Store;
pub use transaction::{Transaction, TxnTag};
