//! Error types for the bitempo core.

use crate::types::{Timestamp, TransactionId};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] bitempo_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] bitempo_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A valid-time range whose end is not after its start.
    #[error("invalid valid-time range: end {end} is not after start {start}")]
    InvalidTimeRange {
        /// Range start.
        start: Timestamp,
        /// Range end.
        end: Timestamp,
    },

    /// The log refused or failed to record a transaction.
    #[error("transaction submission failed: {reason}")]
    SubmissionFailed {
        /// Why the submission failed.
        reason: String,
    },

    /// A wait ran out of time before the indexer caught up.
    #[error("timed out after {timeout:?} waiting for {tx_id} (indexed up to {watermark:?})")]
    SyncTimeout {
        /// The transaction being awaited.
        tx_id: TransactionId,
        /// Highest indexed transaction when the wait gave up.
        watermark: Option<TransactionId>,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The indexing engine stopped or the node was closed.
    #[error("indexing engine unavailable: {reason}")]
    EngineUnavailable {
        /// What took the engine down.
        reason: String,
    },

    /// The caller cancelled a wait.
    #[error("wait for {tx_id} was cancelled")]
    WaitCancelled {
        /// The transaction being awaited.
        tx_id: TransactionId,
    },

    /// The transaction log is corrupted.
    #[error("log corruption: {message}")]
    LogCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// A log entry references a document body the store does not hold.
    #[error("document not found for content hash {hash}")]
    DocumentNotFound {
        /// Hex content hash.
        hash: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Another process holds the node directory.
    #[error("node locked: another process has exclusive access")]
    NodeLocked,

    /// The node has been closed.
    #[error("node is closed")]
    NodeClosed,
}

impl CoreError {
    /// Creates a submission failed error.
    pub fn submission_failed(reason: impl Into<String>) -> Self {
        Self::SubmissionFailed {
            reason: reason.into(),
        }
    }

    /// Creates an engine unavailable error.
    pub fn engine_unavailable(reason: impl Into<String>) -> Self {
        Self::EngineUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a log corruption error.
    pub fn log_corruption(message: impl Into<String>) -> Self {
        Self::LogCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if retrying the same call may succeed.
    ///
    /// Only wait outcomes qualify: the awaited transaction is still on its way
    /// to the indexer.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::SyncTimeout { .. } | Self::WaitCancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        let timeout = CoreError::SyncTimeout {
            tx_id: TransactionId::new(3),
            watermark: Some(TransactionId::new(1)),
            timeout: Duration::from_millis(5),
        };
        assert!(timeout.is_retryable());
        assert!(CoreError::WaitCancelled {
            tx_id: TransactionId::new(1)
        }
        .is_retryable());
        assert!(!CoreError::engine_unavailable("stopped").is_retryable());
        assert!(!CoreError::submission_failed("closed").is_retryable());
    }

    #[test]
    fn messages_name_the_transaction() {
        let err = CoreError::WaitCancelled {
            tx_id: TransactionId::new(7),
        };
        assert_eq!(err.to_string(), "wait for tx:7 was cancelled");

        let err = CoreError::InvalidTimeRange {
            start: Timestamp::from_millis(10),
            end: Timestamp::from_millis(5),
        };
        assert!(err.to_string().contains("end 5 is not after start 10"));
    }
}
