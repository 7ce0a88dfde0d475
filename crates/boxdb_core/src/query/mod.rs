//! Queries.
//!
//! Conditions are built from typed [`Property`] references, collected by a
//! [`QueryBuilder`] and compiled by [`QueryBuilder::build`] into a plan the
//! engine evaluates against raw records:
//!
//! ```rust,ignore
//! let query = store
//!     .box_for::<Note>()?
//!     .query()
//!     .filter(note::TEXT.contains("writing"))
//!     .filter(note::AUTHOR.equals(peter.id))
//!     .build()?;
//! let notes = query.find()?;
//! ```
//!
//! An absent field fails every comparison and only matches
//! [`Property::is_null`].

mod builder;
mod condition;
mod property;

pub use builder::{Query, QueryBuilder};
pub use condition::Condition;
pub use property::{Ordered, Property};
