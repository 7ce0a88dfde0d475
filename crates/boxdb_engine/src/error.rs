//! Engine status codes and errors.
//!
//! Every failure carries a stable numeric status code (see [`code`]) and a
//! human-readable message. Messages are part of the contract: callers match
//! on literal substrings, so they are produced here once and passed through
//! unchanged by upper layers.

use boxdb_codec::CodecError;
use boxdb_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Numeric status codes reported by the engine.
pub mod code {
    /// Success.
    pub const SUCCESS: i32 = 0;
    /// Legacy OS-level "no such file or directory" status.
    pub const NO_SUCH_FILE: i32 = 2;
    /// The requested object does not exist.
    pub const NOT_FOUND: i32 = 404;
    /// An operation was called in a state that does not permit it.
    pub const ILLEGAL_STATE: i32 = 10001;
    /// An argument was invalid.
    pub const ILLEGAL_ARGUMENT: i32 = 10002;
    /// The configured maximum database size was reached.
    pub const DB_FULL: i32 = 10101;
    /// All reader slots are in use.
    pub const MAX_READERS_EXCEEDED: i32 = 10102;
    /// The store hit an unrecoverable condition and must be closed.
    pub const STORE_MUST_SHUTDOWN: i32 = 10103;
    /// Generic storage failure (I/O, directories, files).
    pub const STORAGE_GENERAL: i32 = 10199;
    /// A unique property constraint would be violated.
    pub const UNIQUE_VIOLATED: i32 = 10201;
    /// A query expected at most one result but found more.
    pub const NON_UNIQUE_RESULT: i32 = 10202;
    /// A value does not match the declared property type.
    pub const PROPERTY_TYPE_MISMATCH: i32 = 10203;
    /// The declared model conflicts with the stored model.
    pub const SCHEMA: i32 = 10501;
    /// The data file is damaged.
    pub const FILE_CORRUPT: i32 = 10502;
}

/// Fixed message for an exhausted reader bound.
pub const MAX_READERS_MESSAGE: &str =
    "Could not begin read transaction (maximum of read transactions reached)";

/// Errors reported by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Operation not permitted in the current state.
    #[error("{message}")]
    IllegalState {
        /// Diagnostic message.
        message: String,
    },

    /// Invalid argument, such as an unknown entity id.
    #[error("{message}")]
    IllegalArgument {
        /// Diagnostic message.
        message: String,
    },

    /// The write would exceed the configured maximum size.
    #[error("{message}")]
    DbFull {
        /// Diagnostic message.
        message: String,
    },

    /// Every reader slot is taken.
    #[error("Could not begin read transaction (maximum of read transactions reached)")]
    MaxReadersExceeded,

    /// Directory, file or I/O failure.
    #[error("{message}")]
    StorageGeneral {
        /// Diagnostic message, including paths and OS error text.
        message: String,
    },

    /// A unique property already holds the value in another record.
    #[error("{message}")]
    UniqueViolation {
        /// Diagnostic message.
        message: String,
    },

    /// A query operand does not fit the property's type.
    #[error("{message}")]
    PropertyTypeMismatch {
        /// Diagnostic message.
        message: String,
    },

    /// The declared model conflicts with the stored model.
    #[error("{message}")]
    Schema {
        /// Diagnostic message.
        message: String,
    },

    /// The data file is damaged.
    #[error("{message}")]
    FileCorrupt {
        /// Diagnostic message.
        message: String,
    },

    /// A raw status for which no structured kind exists.
    #[error("{message} ({code})")]
    Status {
        /// Numeric status code.
        code: i32,
        /// Diagnostic message.
        message: String,
    },
}

impl EngineError {
    /// Returns the numeric status code of this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::IllegalState { .. } => code::ILLEGAL_STATE,
            Self::IllegalArgument { .. } => code::ILLEGAL_ARGUMENT,
            Self::DbFull { .. } => code::DB_FULL,
            Self::MaxReadersExceeded => code::MAX_READERS_EXCEEDED,
            Self::StorageGeneral { .. } => code::STORAGE_GENERAL,
            Self::UniqueViolation { .. } => code::UNIQUE_VIOLATED,
            Self::PropertyTypeMismatch { .. } => code::PROPERTY_TYPE_MISMATCH,
            Self::Schema { .. } => code::SCHEMA,
            Self::FileCorrupt { .. } => code::FILE_CORRUPT,
            Self::Status { code, .. } => *code,
        }
    }

    /// Create an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Create an illegal argument error.
    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument {
            message: message.into(),
        }
    }

    /// Create a database full error.
    pub fn db_full(message: impl Into<String>) -> Self {
        Self::DbFull {
            message: message.into(),
        }
    }

    /// Create a storage error.
    pub fn storage_general(message: impl Into<String>) -> Self {
        Self::StorageGeneral {
            message: message.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create a file corruption error.
    pub fn file_corrupt(message: impl Into<String>) -> Self {
        Self::FileCorrupt {
            message: message.into(),
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::PropertyTypeMismatch {
            message: message.into(),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::CapacityExceeded { .. } => Self::db_full(err.to_string()),
            StorageError::Io(_) | StorageError::ReadPastEnd { .. } => {
                Self::storage_general(err.to_string())
            }
        }
    }
}

impl From<CodecError> for EngineError {
    fn from(err: CodecError) -> Self {
        Self::file_corrupt(format!("Invalid record: {err}"))
    }
}

/// Formats an I/O error as `<os code>: <os text>`.
///
/// `std` renders OS errors as `"<text> (os error <code>)"`; the suffix is
/// dropped so the result reads like `2: No such file or directory`.
pub(crate) fn os_error_text(err: &std::io::Error) -> String {
    match err.raw_os_error() {
        Some(os_code) => {
            let rendered = err.to_string();
            let suffix = format!(" (os error {os_code})");
            let text = rendered.strip_suffix(&suffix).unwrap_or(&rendered);
            format!("{os_code}: {text}")
        }
        None => err.to_string(),
    }
}
