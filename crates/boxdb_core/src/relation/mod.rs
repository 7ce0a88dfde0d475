//! Relation proxies.
//!
//! - [`ToOne`]: a relation property holding the id of one target object
//! - [`ToMany`]: a standalone relation table, or the backlink of a
//!   [`ToOne`] on the target type

mod to_many;
mod to_one;

pub use to_many::ToMany;
pub use to_one::ToOne;
