//! Node configuration.

use std::time::Duration;

/// Configuration for opening a node.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the node directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the log after every submission (safer but slower).
    /// When false, entries are only flushed to the OS.
    pub sync_on_submit: bool,

    /// Largest encoded log entry accepted, in bytes.
    pub max_entry_size: usize,

    /// Timeout used by [`crate::Node::sync_default`].
    pub default_sync_timeout: Duration,

    /// Most logged transactions allowed to wait for the indexer (0 = no limit).
    ///
    /// Once the backlog reaches this size, submissions fail with
    /// [`crate::CoreError::SubmissionFailed`] before anything is written.
    /// Submitters never wait for the indexer.
    pub max_index_backlog: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_submit: true,
            max_entry_size: 16 * 1024 * 1024, // 16 MB
            default_sync_timeout: Duration::from_secs(10),
            max_index_backlog: 0,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the node directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync the log on every submission.
    #[must_use]
    pub const fn sync_on_submit(mut self, value: bool) -> Self {
        self.sync_on_submit = value;
        self
    }

    /// Sets the largest accepted log entry.
    #[must_use]
    pub const fn max_entry_size(mut self, size: usize) -> Self {
        self.max_entry_size = size;
        self
    }

    /// Sets the timeout used by `sync_default`.
    #[must_use]
    pub const fn default_sync_timeout(mut self, timeout: Duration) -> Self {
        self.default_sync_timeout = timeout;
        self
    }

    /// Sets the largest indexing backlog submissions may build up.
    #[must_use]
    pub const fn max_index_backlog(mut self, limit: usize) -> Self {
        self.max_index_backlog = limit;
        self
    }
}
