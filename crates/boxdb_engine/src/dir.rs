//! Store directory management.
//!
//! ```text
//! <directory>/
//! ├─ data.bxdb   # single append-only data file
//! └─ lock        # advisory lock, held while the store is open
//! ```

use crate::error::{os_error_text, EngineError, EngineResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const DATA_FILE: &str = "data.bxdb";
const LOCK_FILE: &str = "lock";

/// An opened, exclusively locked store directory.
#[derive(Debug)]
pub(crate) struct StoreDir {
    path: PathBuf,
    _lock_file: File,
}

impl StoreDir {
    /// Prepares the directory and takes the lock.
    ///
    /// The directory itself is created if missing, but its parent must exist.
    pub fn open(path: &Path, file_mode: u32) -> EngineResult<Self> {
        if !path.exists() {
            fs::create_dir(path).map_err(|e| prepare_error(path, &e))?;
        } else if !path.is_dir() {
            return Err(EngineError::storage_general(format!(
                "Could not prepare directory: {} (not a directory)",
                path.display()
            )));
        }

        let lock_path = path.join(LOCK_FILE);
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(file_mode);
        }
        #[cfg(not(unix))]
        let _ = file_mode;

        let lock_file = options.open(&lock_path).map_err(|e| {
            EngineError::storage_general(format!(
                "Could not open lock file {} ({})",
                lock_path.display(),
                os_error_text(&e)
            ))
        })?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::illegal_state(format!(
                "Cannot open store: another store is still open using the same path {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the data file path.
    pub fn data_path(&self) -> PathBuf {
        self.path.join(DATA_FILE)
    }
}

fn prepare_error(path: &Path, err: &std::io::Error) -> EngineError {
    EngineError::storage_general(format!(
        "Could not prepare directory: {} ({})",
        path.display(),
        os_error_text(err)
    ))
}
