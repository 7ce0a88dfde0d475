//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level storage backend for BoxDB.
///
/// Storage backends are **opaque byte stores**. They provide simple operations
/// for reading, appending, and flushing data. The engine owns all file format
/// interpretation.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `append` either writes all of `data` or nothing (capacity limits are
///   checked up front)
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `flush` ensures all appended data is durable
/// - Backends must be `Send + Sync` for concurrent access
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range extends beyond the current size or an
    /// I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::CapacityExceeded`] if the append would
    /// exceed the backend's limit, or an I/O error.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Flushes all pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// This is the offset where the next `append` will write.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to the given size.
    ///
    /// Used to cut off a torn tail found during recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the truncation fails or `new_size` is greater than
    /// the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Returns the capacity limit in bytes, if any.
    fn limit(&self) -> Option<u64>;
}
