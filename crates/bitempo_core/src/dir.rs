//! Node directory layout and locking.
//!
//! ```text
//! <node_path>/
//! ├─ LOCK       # advisory lock, one process at a time
//! ├─ tx.log     # transaction log
//! └─ docs.dat   # content-addressed document bodies
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "tx.log";
const DOCS_FILE: &str = "docs.dat";

/// An opened node directory.
///
/// Holds an exclusive lock on the `LOCK` file for as long as it lives; the
/// lock is released when the value is dropped.
#[derive(Debug)]
pub struct NodeDir {
    path: PathBuf,
    _lock_file: File,
}

impl NodeDir {
    /// Opens, and optionally creates, a node directory and locks it.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidOperation`] if the path is missing and
    ///   `create_if_missing` is false, or is not a directory
    /// - [`CoreError::NodeLocked`] if another process holds the lock
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_operation(format!(
                    "node directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_operation(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::NodeLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the transaction log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    /// Returns the path of the document store.
    #[must_use]
    pub fn docs_path(&self) -> PathBuf {
        self.path.join(DOCS_FILE)
    }
}
