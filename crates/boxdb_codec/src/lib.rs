//! # BoxDB Codec
//!
//! The binary record format shared by the BoxDB engine and typed layer.
//!
//! A record is addressed by *property offsets*: property `id` lives at vtable
//! offset `2 + 2 * id`, so property 1 is found at offset 4. Fields that were
//! never written are absent and readers report them as `None`, which keeps
//! "stored as zero" distinct from "never stored".
//!
//! ## Layout
//!
//! ```text
//! [u16 vtable_len][u16 inline_len][u16 slot; ...]   vtable, slot = inline position or 0
//! [u32 marker][inline field bytes ...]               inline area
//! [u32 len][bytes] ...                               data area (strings, byte vectors)
//! ```
//!
//! Scalars are stored inline in little-endian order. Strings and byte
//! vectors store an inline `u32` pointing at their entry in the data area.
//!
//! ## Usage
//!
//! ```
//! use boxdb_codec::{property_offset, RecordBuilder, RecordReader};
//!
//! let mut builder = RecordBuilder::new();
//! builder.put_u64(property_offset(1), 7).unwrap();
//! builder.put_str(property_offset(2), "hello").unwrap();
//! let bytes = builder.finish().unwrap();
//!
//! let reader = RecordReader::new(&bytes).unwrap();
//! assert_eq!(reader.read_u64(property_offset(1)).unwrap(), Some(7));
//! assert_eq!(reader.read_str(property_offset(2)).unwrap(), Some("hello"));
//! assert_eq!(reader.read_i32(property_offset(3)).unwrap(), None);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod error;
mod reader;
mod types;
mod value;

pub use builder::RecordBuilder;
pub use error::{CodecError, CodecResult};
pub use reader::RecordReader;
pub use types::{property_offset, PropertyFlags, PropertyType, MAX_PROPERTY_ID, PLATFORM_INT};
pub use value::Value;

/// First four bytes of every inline area.
pub(crate) const INLINE_MARKER: u32 = 0x3152_5842; // "BXR1"

/// Size of the fixed vtable header (`vtable_len` + `inline_len`).
pub(crate) const HEADER_SIZE: usize = 4;
