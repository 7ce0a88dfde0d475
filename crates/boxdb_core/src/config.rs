//! Store configuration.

use boxdb_engine::{EngineOptions, DEFAULT_MAX_SIZE_KB};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory used when none is given.
pub const DEFAULT_DIRECTORY: &str = "boxdb";

/// Configuration for opening a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Store directory. Created if missing; its parent must exist.
    pub directory: PathBuf,

    /// Maximum size of the store in KiB.
    pub max_size_kb: u64,

    /// Permission bits for newly created files (Unix only).
    pub file_mode: u32,

    /// Maximum number of concurrently open read transactions (0 = 126).
    pub max_readers: u32,

    /// How long to wait for the write slot; `None` waits indefinitely.
    pub write_timeout: Option<Duration>,

    /// Keep all data in memory; `directory` is ignored.
    pub in_memory: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            max_size_kb: DEFAULT_MAX_SIZE_KB,
            file_mode: 0o644,
            max_readers: 0,
            write_timeout: None,
            in_memory: false,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration for a store in `directory`.
    #[must_use]
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Creates a configuration for an in-memory store.
    #[must_use]
    pub fn memory() -> Self {
        Self::default().in_memory(true)
    }

    /// Sets the maximum store size in KiB.
    #[must_use]
    pub const fn max_size_kb(mut self, size_kb: u64) -> Self {
        self.max_size_kb = size_kb;
        self
    }

    /// Sets the permission bits for new files.
    #[must_use]
    pub const fn file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    /// Sets the reader bound.
    #[must_use]
    pub const fn max_readers(mut self, max_readers: u32) -> Self {
        self.max_readers = max_readers;
        self
    }

    /// Sets how long beginning a write transaction may wait.
    #[must_use]
    pub const fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Sets whether the store lives only in memory.
    #[must_use]
    pub const fn in_memory(mut self, value: bool) -> Self {
        self.in_memory = value;
        self
    }

    pub(crate) fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            max_size_kb: self.max_size_kb,
            file_mode: self.file_mode,
            max_readers: self.max_readers,
            write_timeout: self.write_timeout,
            ..EngineOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxdb_engine::DEFAULT_MAX_READERS;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.directory, PathBuf::from("boxdb"));
        assert_eq!(config.max_size_kb, 1024 * 1024);
        assert_eq!(config.file_mode, 0o644);
        assert_eq!(config.max_readers, 0);
        assert!(config.write_timeout.is_none());
        assert!(!config.in_memory);
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new("/tmp/notes")
            .max_size_kb(512)
            .max_readers(1)
            .file_mode(0o600)
            .write_timeout(Duration::from_secs(1));

        assert_eq!(config.directory, PathBuf::from("/tmp/notes"));
        assert_eq!(config.max_size_kb, 512);
        assert_eq!(config.max_readers, 1);
        assert_eq!(config.file_mode, 0o600);
        assert_eq!(config.write_timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn zero_readers_selects_the_engine_default() {
        let options = StoreConfig::memory().engine_options();
        assert_eq!(options.effective_max_readers(), DEFAULT_MAX_READERS);
        assert_eq!(options.max_size_bytes(), 1024 * 1024 * 1024);
    }
}
