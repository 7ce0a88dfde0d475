//! Error types for BoxDB.
//!
//! Every failure reported by the engine is translated into a [`BoxError`]
//! exactly once, at the boundary, and logged there.

use boxdb_codec::CodecError;
use boxdb_engine::{code, EngineError};
use thiserror::Error;
use tracing::warn;

/// Result type for BoxDB operations.
pub type BoxResult<T> = Result<T, BoxError>;

/// Prefix of the engine message for a write requested while the same thread
/// holds a read transaction.
const WRITE_INSIDE_READ: &str = "Cannot start a write transaction inside a read only transaction";

/// Errors that can occur in BoxDB operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoxError {
    /// Directory, file or I/O failure. The message carries the failing path
    /// and the OS error text where there is one.
    #[error("{message}")]
    StorageGeneral {
        /// Diagnostic message.
        message: String,
    },

    /// The store reached its maximum size.
    #[error("{message}")]
    DbFull {
        /// Diagnostic message.
        message: String,
    },

    /// Every read transaction slot is in use.
    #[error("Could not begin read transaction (maximum of read transactions reached)")]
    MaxReadersExceeded,

    /// Operation not permitted in the current state.
    #[error("{message}")]
    IllegalState {
        /// Diagnostic message.
        message: String,
    },

    /// Invalid argument.
    #[error("{message}")]
    IllegalArgument {
        /// Diagnostic message.
        message: String,
    },

    /// A write was requested on a thread that holds a read transaction.
    #[error("{message}")]
    CannotWriteWhileReading {
        /// Diagnostic message.
        message: String,
    },

    /// A unique property value is already used by another object.
    #[error("{message}")]
    UniqueViolation {
        /// Diagnostic message.
        message: String,
    },

    /// A query expected at most one result but found more.
    #[error("{message}")]
    NonUniqueResult {
        /// Diagnostic message.
        message: String,
    },

    /// A value does not fit the type of the property it is used with.
    #[error("{message}")]
    PropertyTypeMismatch {
        /// Diagnostic message.
        message: String,
    },

    /// The declared model is inconsistent or conflicts with the stored one.
    #[error("{message}")]
    Schema {
        /// Diagnostic message.
        message: String,
    },

    /// Stored data could not be decoded.
    #[error("{message}")]
    FileCorrupt {
        /// Diagnostic message.
        message: String,
    },

    /// A relation was applied for an owner that has not been put yet.
    #[error("Cannot relate to unsaved entities: put the owning {owner} first")]
    CannotRelateToUnsavedEntities {
        /// Owner entity name.
        owner: &'static str,
    },

    /// A relation proxy was used before being attached to a store.
    #[error("Relation to {target} is not attached to a store")]
    NotAttached {
        /// Target entity name.
        target: &'static str,
    },

    /// A status the taxonomy does not know; code and message are kept.
    #[error("{message} ({code})")]
    Unknown {
        /// Raw status code.
        code: i32,
        /// Raw message.
        message: String,
    },
}

impl BoxError {
    /// Returns the status code this error corresponds to.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::StorageGeneral { .. } => code::STORAGE_GENERAL,
            Self::DbFull { .. } => code::DB_FULL,
            Self::MaxReadersExceeded => code::MAX_READERS_EXCEEDED,
            Self::IllegalState { .. }
            | Self::CannotWriteWhileReading { .. }
            | Self::NotAttached { .. } => code::ILLEGAL_STATE,
            Self::IllegalArgument { .. } | Self::CannotRelateToUnsavedEntities { .. } => {
                code::ILLEGAL_ARGUMENT
            }
            Self::UniqueViolation { .. } => code::UNIQUE_VIOLATED,
            Self::NonUniqueResult { .. } => code::NON_UNIQUE_RESULT,
            Self::PropertyTypeMismatch { .. } => code::PROPERTY_TYPE_MISMATCH,
            Self::Schema { .. } => code::SCHEMA,
            Self::FileCorrupt { .. } => code::FILE_CORRUPT,
            Self::Unknown { code, .. } => *code,
        }
    }

    /// Translates a raw status code and message.
    ///
    /// Used for statuses that carry no structured kind. Code `2` is the
    /// legacy "no such file" status and counts as a storage failure.
    #[must_use]
    pub fn from_status(status: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            code::NO_SUCH_FILE | code::STORAGE_GENERAL => Self::StorageGeneral { message },
            code::DB_FULL => Self::DbFull { message },
            code::MAX_READERS_EXCEEDED => Self::MaxReadersExceeded,
            code::ILLEGAL_STATE if message.starts_with(WRITE_INSIDE_READ) => {
                Self::CannotWriteWhileReading { message }
            }
            code::ILLEGAL_STATE => Self::IllegalState { message },
            code::ILLEGAL_ARGUMENT => Self::IllegalArgument { message },
            code::UNIQUE_VIOLATED => Self::UniqueViolation { message },
            code::NON_UNIQUE_RESULT => Self::NonUniqueResult { message },
            code::PROPERTY_TYPE_MISMATCH => Self::PropertyTypeMismatch { message },
            code::SCHEMA => Self::Schema { message },
            code::FILE_CORRUPT => Self::FileCorrupt { message },
            other => Self::Unknown {
                code: other,
                message,
            },
        }
    }

    /// Creates an illegal argument error.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument {
            message: message.into(),
        }
    }

    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates a property type mismatch error.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::PropertyTypeMismatch {
            message: message.into(),
        }
    }

    /// Creates a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }
}

impl From<EngineError> for BoxError {
    fn from(err: EngineError) -> Self {
        let status = err.code();
        let translated = match err {
            EngineError::StorageGeneral { message } => Self::StorageGeneral { message },
            EngineError::DbFull { message } => Self::DbFull { message },
            EngineError::MaxReadersExceeded => Self::MaxReadersExceeded,
            EngineError::IllegalState { message } if message.starts_with(WRITE_INSIDE_READ) => {
                Self::CannotWriteWhileReading { message }
            }
            EngineError::IllegalState { message } => Self::IllegalState { message },
            EngineError::IllegalArgument { message } => Self::IllegalArgument { message },
            EngineError::UniqueViolation { message } => Self::UniqueViolation { message },
            EngineError::PropertyTypeMismatch { message } => Self::PropertyTypeMismatch { message },
            EngineError::Schema { message } => Self::Schema { message },
            EngineError::FileCorrupt { message } => Self::FileCorrupt { message },
            EngineError::Status { code: raw, message } => Self::from_status(raw, message),
        };
        warn!(code = status, error = %translated, "engine reported an error");
        translated
    }
}

impl From<CodecError> for BoxError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::TooLarge { .. } | CodecError::InvalidOffset { .. } => {
                Self::illegal_argument(err.to_string())
            }
            _ => Self::FileCorrupt {
                message: format!("Invalid record: {err}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxdb_engine::MAX_READERS_MESSAGE;

    #[test]
    fn structured_kinds_translate_directly() {
        let err = BoxError::from(EngineError::db_full("Could not put"));
        assert_eq!(
            err,
            BoxError::DbFull {
                message: "Could not put".into()
            }
        );
        assert_eq!(err.to_string(), "Could not put");

        let err = BoxError::from(EngineError::MaxReadersExceeded);
        assert_eq!(err, BoxError::MaxReadersExceeded);
        assert_eq!(err.to_string(), MAX_READERS_MESSAGE);
    }

    #[test]
    fn storage_messages_pass_through_unchanged() {
        let message = "Could not prepare directory: /x/y (2: No such file or directory)";
        let err = BoxError::from(EngineError::storage_general(message));
        assert_eq!(err.to_string(), message);
        assert_eq!(err.code(), code::STORAGE_GENERAL);
    }

    #[test]
    fn legacy_codes_use_the_table() {
        let err = BoxError::from(EngineError::Status {
            code: 2,
            message: "Could not prepare directory: /x (2: No such file or directory)".into(),
        });
        assert!(matches!(err, BoxError::StorageGeneral { .. }));

        let err = BoxError::from_status(code::MAX_READERS_EXCEEDED, "whatever");
        assert_eq!(err, BoxError::MaxReadersExceeded);

        let err = BoxError::from_status(code::DB_FULL, "Could not put");
        assert_eq!(err.to_string(), "Could not put");
    }

    #[test]
    fn write_inside_read_is_recognized_by_message() {
        let message = format!("{WRITE_INSIDE_READ} (thread 3)");
        let structured = BoxError::from(EngineError::illegal_state(message.clone()));
        let legacy = BoxError::from_status(code::ILLEGAL_STATE, message);
        assert!(matches!(structured, BoxError::CannotWriteWhileReading { .. }));
        assert_eq!(structured, legacy);

        let other = BoxError::from_status(code::ILLEGAL_STATE, "something else");
        assert!(matches!(other, BoxError::IllegalState { .. }));
    }

    #[test]
    fn unknown_codes_keep_code_and_message() {
        let err = BoxError::from_status(4711, "strange");
        assert_eq!(
            err,
            BoxError::Unknown {
                code: 4711,
                message: "strange".into()
            }
        );
        assert_eq!(err.code(), 4711);
        assert_eq!(err.to_string(), "strange (4711)");
    }
}
