//! Dynamic field values.

use std::cmp::Ordering;
use std::fmt;

/// A field value decoded without static type information.
///
/// The engine evaluates query conditions on these. Integers are widened to
/// 64 bits; `Int` and `UInt` compare numerically with each other, and both
/// compare with `Float`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Signed integer, also used for dates.
    Int(i64),
    /// Unsigned integer, also used for relation target ids.
    UInt(u64),
    /// Floating point value.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Byte sequence.
    Bytes(Vec<u8>),
}

impl Value {
    /// Compares two values of compatible kinds.
    ///
    /// Returns `None` for incompatible kinds and for comparisons involving NaN.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::UInt(a), Self::UInt(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::UInt(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Self::UInt(a), Self::Int(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Float(a), Self::UInt(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::UInt(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the value's kind, used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_sign_integers_compare_numerically() {
        assert_eq!(Value::Int(-1).compare(&Value::UInt(0)), Some(Ordering::Less));
        assert_eq!(
            Value::UInt(u64::MAX).compare(&Value::Int(i64::MAX)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Int(3).compare(&Value::UInt(3)), Some(Ordering::Equal));
    }

    #[test]
    fn floats_compare_with_integers() {
        assert_eq!(Value::Float(2.5).compare(&Value::Int(2)), Some(Ordering::Greater));
        assert_eq!(Value::Float(f64::NAN).compare(&Value::Float(1.0)), None);
    }

    #[test]
    fn incompatible_kinds_do_not_compare() {
        assert_eq!(Value::String("1".into()).compare(&Value::Int(1)), None);
        assert_eq!(Value::Bool(true).compare(&Value::UInt(1)), None);
    }
}
