//! The transaction log file.

use crate::error::{CoreError, CoreResult};
use crate::frame::{FrameFormat, MAX_PAYLOAD_SIZE};
use crate::log::entry::LogEntry;
use crate::types::TransactionId;
use bitempo_storage::StorageBackend;
use tracing::{debug, info, warn};

/// What opening a log found.
#[derive(Debug, Default)]
pub struct Recovery {
    /// Every complete entry, in id order.
    pub entries: Vec<LogEntry>,
    /// Bytes of torn tail that were cut off.
    pub truncated_bytes: u64,
}

/// Append-only log of transaction entries over a storage backend.
///
/// Each entry is one frame (see [`crate::frame`]), so an entry is either
/// fully recorded or, after a crash, a torn tail that the next open removes.
/// The log keeps the offset of every entry so reads can start at any id.
///
/// `TxLog` is not internally synchronized; the submission path owns it behind
/// its lock.
pub struct TxLog {
    backend: Box<dyn StorageBackend>,
    sync_on_append: bool,
    max_entry_size: usize,
    /// `offsets[i]` is where the entry with id `i + 1` starts.
    offsets: Vec<u64>,
    end: u64,
    closed: bool,
}

impl TxLog {
    /// Opens a log, recovering its contents.
    ///
    /// A torn tail is truncated away. Entries must carry consecutive ids
    /// starting at 1 and non-decreasing times. `max_entry_size` is capped at
    /// what a frame can hold.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LogCorruption`] or [`CoreError::ChecksumMismatch`]
    /// for damaged data, or a storage error if the backend fails.
    pub fn open(
        mut backend: Box<dyn StorageBackend>,
        sync_on_append: bool,
        max_entry_size: usize,
    ) -> CoreResult<(Self, Recovery)> {
        let mut recovery = Recovery::default();
        let mut offsets = Vec::new();

        let (valid_end, total_size) = {
            let mut frames = FrameFormat::TX_LOG.frames(backend.as_ref(), 0)?;
            for frame in frames.by_ref() {
                let frame = frame?;
                let entry = LogEntry::decode(&frame.payload)?;
                check_sequence(recovery.entries.last(), &entry, frame.offset)?;
                offsets.push(frame.offset);
                recovery.entries.push(entry);
            }
            (frames.valid_end(), frames.total_size())
        };

        if valid_end < total_size {
            recovery.truncated_bytes = total_size - valid_end;
            warn!(
                target: "bitempo::log",
                offset = valid_end,
                bytes = recovery.truncated_bytes,
                "discarding torn tail of transaction log"
            );
            backend.truncate(valid_end)?;
        }

        if !recovery.entries.is_empty() {
            info!(
                target: "bitempo::log",
                entries = recovery.entries.len(),
                "recovered transaction log"
            );
        }

        let log = Self {
            backend,
            sync_on_append,
            max_entry_size: max_entry_size.min(MAX_PAYLOAD_SIZE),
            offsets,
            end: valid_end,
            closed: false,
        };
        Ok((log, recovery))
    }

    /// Appends an entry and makes it durable.
    ///
    /// The entry's id must be the next one after the last appended.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SubmissionFailed`] if the log is closed, the entry
    /// is too large, or the backend write fails. On failure nothing is
    /// recorded.
    pub fn append(&mut self, entry: &LogEntry) -> CoreResult<u64> {
        if self.closed {
            return Err(CoreError::submission_failed("log is closed"));
        }

        let expected = self.next_id();
        if entry.instant.tx_id != expected {
            return Err(CoreError::submission_failed(format!(
                "out of order append: got {}, expected {expected}",
                entry.instant.tx_id
            )));
        }

        let payload = entry
            .encode()
            .map_err(|e| CoreError::submission_failed(format!("cannot encode entry: {e}")))?;
        if payload.len() > self.max_entry_size {
            return Err(CoreError::submission_failed(format!(
                "entry is {} bytes, limit is {}",
                payload.len(),
                self.max_entry_size
            )));
        }
        let frame = FrameFormat::TX_LOG
            .encode(&payload)
            .map_err(|e| CoreError::submission_failed(format!("cannot frame entry: {e}")))?;

        let offset = match self.write_frame(&frame) {
            Ok(offset) => offset,
            Err(e) => {
                self.discard_partial_write();
                return Err(CoreError::submission_failed(format!("log write failed: {e}")));
            }
        };

        self.offsets.push(offset);
        self.end = offset + frame.len() as u64;
        debug!(
            target: "bitempo::log",
            tx_id = entry.instant.tx_id.as_u64(),
            offset,
            bytes = frame.len(),
            "appended entry"
        );
        Ok(offset)
    }

    fn write_frame(&mut self, frame: &[u8]) -> CoreResult<u64> {
        let offset = self.backend.append(frame)?;
        if self.sync_on_append {
            self.backend.sync()?;
        } else {
            self.backend.flush()?;
        }
        Ok(offset)
    }

    fn discard_partial_write(&mut self) {
        match self.backend.size() {
            Ok(size) if size > self.end => {
                if let Err(e) = self.backend.truncate(self.end) {
                    warn!(
                        target: "bitempo::log",
                        error = %e,
                        "could not remove partial entry; it will be discarded on reopen"
                    );
                }
            }
            _ => {}
        }
    }

    /// Reads the entries with id greater than `after`, in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails or an entry is damaged.
    pub fn entries_after(&self, after: Option<TransactionId>) -> CoreResult<Vec<LogEntry>> {
        let skip = after.map_or(0, |id| id.as_u64());
        let Some(&start) = usize::try_from(skip)
            .ok()
            .and_then(|index| self.offsets.get(index))
        else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::with_capacity(self.offsets.len() - skip as usize);
        for frame in FrameFormat::TX_LOG.frames(self.backend.as_ref(), start)? {
            let frame = frame?;
            if frame.offset >= self.end {
                break;
            }
            entries.push(LogEntry::decode(&frame.payload)?);
        }
        Ok(entries)
    }

    /// Returns the largest encoded entry [`TxLog::append`] accepts.
    pub fn max_entry_size(&self) -> usize {
        self.max_entry_size
    }

    /// Returns the id the next appended entry must carry.
    pub fn next_id(&self) -> TransactionId {
        TransactionId::new(self.offsets.len() as u64 + 1)
    }

    /// Returns the number of recorded entries.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Returns the byte size of the recorded entries.
    pub fn size(&self) -> u64 {
        self.end
    }

    /// Refuses further appends and flushes the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn close(&mut self) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.backend.flush()?;
        Ok(())
    }

    /// Returns true once [`TxLog::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

fn check_sequence(prev: Option<&LogEntry>, entry: &LogEntry, offset: u64) -> CoreResult<()> {
    let expected = prev.map_or(TransactionId::FIRST, |p| p.instant.tx_id.next());
    if entry.instant.tx_id != expected {
        return Err(CoreError::log_corruption(format!(
            "entry at offset {offset} has id {}, expected {expected}",
            entry.instant.tx_id
        )));
    }
    if let Some(prev) = prev {
        if entry.instant.tx_time < prev.instant.tx_time {
            return Err(CoreError::log_corruption(format!(
                "entry at offset {offset} goes back in time"
            )));
        }
    }
    Ok(())
}
