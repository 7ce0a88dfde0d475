//! Value-type tags and property flags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    /// One byte, 0 or 1.
    Bool,
    /// 8-bit integer.
    Byte,
    /// 16-bit integer.
    Short,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// UTF-8 string.
    String,
    /// Arbitrary byte sequence.
    ByteVector,
    /// Milliseconds since the Unix epoch, stored as a 64-bit integer.
    Date,
    /// Target id of a to-one relation, stored as a 64-bit integer.
    Relation,
}

/// Storage type used for `isize`/`usize` fields on this target.
///
/// Fixed at build time so encoding and decoding always agree.
pub const PLATFORM_INT: PropertyType = if cfg!(target_pointer_width = "32") {
    PropertyType::Int
} else {
    PropertyType::Long
};

impl PropertyType {
    /// Width of the inline representation in bytes.
    ///
    /// Strings and byte vectors store a 4-byte pointer inline.
    #[must_use]
    pub const fn inline_width(self) -> usize {
        match self {
            Self::Bool | Self::Byte => 1,
            Self::Short => 2,
            Self::Int | Self::Float | Self::String | Self::ByteVector => 4,
            Self::Long | Self::Double | Self::Date | Self::Relation => 8,
        }
    }

    /// Returns true for all integer-backed types, including dates and relations.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Byte | Self::Short | Self::Int | Self::Long | Self::Date | Self::Relation
        )
    }

    /// Returns true for `Float` and `Double`.
    #[must_use]
    pub const fn is_floating(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::ByteVector => "byte-vector",
            Self::Date => "date",
            Self::Relation => "relation",
        };
        f.write_str(name)
    }
}

/// Flags attached to a property descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyFlags(u32);

impl PropertyFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// The property is the entity's primary key.
    pub const ID: Self = Self(0x01);
    /// Integer values are interpreted as unsigned.
    pub const UNSIGNED: Self = Self(0x02);
    /// The property is indexed.
    pub const INDEXED: Self = Self(0x04);
    /// Stored values must be unique across the entity's records.
    pub const UNIQUE: Self = Self(0x08);

    /// Creates flags from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns the union of both flag sets.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Checks whether all flags in `other` are set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Highest property id a model may declare.
pub const MAX_PROPERTY_ID: u16 = 32_000;

/// Vtable offset of the property with the given id.
///
/// Property 1 lives at offset 4; each further id adds 2. Ids above
/// [`MAX_PROPERTY_ID`] are rejected by model validation; for them the offset
/// saturates at `u16::MAX`, which record readers and builders reject as
/// invalid instead of aliasing another property.
#[must_use]
pub const fn property_offset(property_id: u16) -> u16 {
    property_id.saturating_mul(2).saturating_add(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_property_ids() {
        assert_eq!(property_offset(1), 4);
        assert_eq!(property_offset(2), 6);
        assert_eq!(property_offset(10), 22);
        assert_eq!(property_offset(MAX_PROPERTY_ID), 64_002);
    }

    #[test]
    fn out_of_range_offsets_saturate() {
        assert_eq!(property_offset(32_767), u16::MAX);
        assert_eq!(property_offset(u16::MAX), u16::MAX);
    }

    #[test]
    fn platform_int_matches_pointer_width() {
        assert_eq!(
            PLATFORM_INT.inline_width(),
            std::mem::size_of::<isize>()
        );
    }

    #[test]
    fn flags_compose() {
        let flags = PropertyFlags::ID.with(PropertyFlags::UNSIGNED);
        assert!(flags.contains(PropertyFlags::ID));
        assert!(flags.contains(PropertyFlags::UNSIGNED));
        assert!(!flags.contains(PropertyFlags::UNIQUE));
        assert_eq!(PropertyFlags::from_bits(flags.bits()), flags);
    }
}
