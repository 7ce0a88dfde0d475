//! Engine open options.

use std::time::Duration;

/// Reader slots available when `max_readers` is left at 0.
pub const DEFAULT_MAX_READERS: u32 = 126;

/// Default maximum database size: 1 GiB.
pub const DEFAULT_MAX_SIZE_KB: u64 = 1024 * 1024;

/// Options passed to [`crate::Engine::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Maximum size of the data file in KiB.
    pub max_size_kb: u64,
    /// Permission bits for newly created files (Unix only).
    pub file_mode: u32,
    /// Maximum number of concurrently open read transactions; 0 selects
    /// [`DEFAULT_MAX_READERS`].
    pub max_readers: u32,
    /// How long to wait for the writer slot; `None` waits indefinitely.
    pub write_timeout: Option<Duration>,
    /// Whether to `fsync` the data file on every commit.
    pub sync_on_commit: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_size_kb: DEFAULT_MAX_SIZE_KB,
            file_mode: 0o644,
            max_readers: 0,
            write_timeout: None,
            sync_on_commit: true,
        }
    }
}

impl EngineOptions {
    /// Returns the reader bound after applying the default for 0.
    #[must_use]
    pub const fn effective_max_readers(&self) -> u32 {
        if self.max_readers == 0 {
            DEFAULT_MAX_READERS
        } else {
            self.max_readers
        }
    }

    /// Returns the size limit in bytes.
    #[must_use]
    pub const fn max_size_bytes(&self) -> u64 {
        self.max_size_kb.saturating_mul(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_readers_selects_default() {
        let options = EngineOptions::default();
        assert_eq!(options.effective_max_readers(), DEFAULT_MAX_READERS);

        let options = EngineOptions {
            max_readers: 1,
            ..EngineOptions::default()
        };
        assert_eq!(options.effective_max_readers(), 1);
    }

    #[test]
    fn size_limit_is_in_kib() {
        let options = EngineOptions {
            max_size_kb: 16,
            ..EngineOptions::default()
        };
        assert_eq!(options.max_size_bytes(), 16 * 1024);
    }
}
