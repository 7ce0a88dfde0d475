//! Typed object identifiers.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Identifier of an object of entity type `E`.
///
/// Ids are 64-bit and assigned by the store on the first put:
/// - `0` means "not yet persisted" and never names a stored object
/// - Non-zero ids are unique within the entity
/// - Ids of removed objects are not reused
pub struct Id<E> {
    value: u64,
    _marker: PhantomData<fn() -> E>,
}

impl<E> Id<E> {
    /// The id of an object that has not been put yet.
    pub const NONE: Self = Self::new(0);

    /// Creates an id from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.value
    }

    /// Returns true for a non-zero id.
    #[inline]
    #[must_use]
    pub const fn is_stored(self) -> bool {
        self.value != 0
    }
}

impl<E> Clone for Id<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Id<E> {}

impl<E> Default for Id<E> {
    fn default() -> Self {
        Self::NONE
    }
}

impl<E> PartialEq for Id<E> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<E> Eq for Id<E> {}

impl<E> PartialOrd for Id<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Id<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<E> Hash for Id<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<E> From<u64> for Id<E> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<E> fmt::Debug for Id<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.value)
    }
}

impl<E> fmt::Display for Id<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
