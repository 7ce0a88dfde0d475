//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while building or reading records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The record header or vtable is malformed.
    #[error("invalid record header: {message}")]
    InvalidHeader {
        /// Description of the problem.
        message: String,
    },

    /// A field or data entry points outside the record.
    #[error("record truncated: need {needed} bytes at {position}, record has {len}")]
    Truncated {
        /// Position of the access.
        position: usize,
        /// Number of bytes needed.
        needed: usize,
        /// Total record length.
        len: usize,
    },

    /// A property offset is not a valid vtable slot.
    #[error("invalid property offset {offset}")]
    InvalidOffset {
        /// The rejected offset.
        offset: u16,
    },

    /// A string field does not contain valid UTF-8.
    #[error("invalid UTF-8 in string at offset {offset}")]
    InvalidUtf8 {
        /// Property offset of the string.
        offset: u16,
    },

    /// The record exceeds what the format can address.
    #[error("record too large: {message}")]
    TooLarge {
        /// Which limit was exceeded.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create a too-large error.
    pub fn too_large(message: impl Into<String>) -> Self {
        Self::TooLarge {
            message: message.into(),
        }
    }
}
