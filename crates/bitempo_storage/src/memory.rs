//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct MemoryState {
    data: RwLock<Vec<u8>>,
    closed: AtomicBool,
}

/// An in-memory append-only backend.
///
/// The bytes live behind a shared state so a [`MemoryHandle`] taken before the
/// backend is boxed into a log can still inspect or damage it. Tests use this
/// to take the store offline, tear the last write, or "restart" by opening a
/// second backend over the same bytes.
///
/// # Example
///
/// ```rust
/// use bitempo_storage::{InMemoryBackend, StorageBackend, StorageError};
///
/// let mut backend = InMemoryBackend::new();
/// let handle = backend.handle();
/// backend.append(b"abc").unwrap();
///
/// handle.close();
/// assert!(matches!(backend.append(b"d"), Err(StorageError::Closed)));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Arc<MemoryState>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            state: Arc::new(MemoryState {
                data: RwLock::new(data),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Opens another backend over the bytes behind `handle`.
    ///
    /// The new backend shares storage with every other backend and handle on
    /// the same state, which is how tests model a restart.
    #[must_use]
    pub fn from_handle(handle: &MemoryHandle) -> Self {
        Self {
            state: Arc::clone(&handle.state),
        }
    }

    /// Returns a handle on this backend's shared state.
    #[must_use]
    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.state.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.ensure_open()?;
        let data = self.state.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        self.ensure_open()?;
        let mut data = self.state.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.ensure_open()
    }

    fn size(&self) -> StorageResult<u64> {
        self.ensure_open()?;
        Ok(self.state.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.ensure_open()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.ensure_open()?;
        let mut data = self.state.data.write();
        let size = data.len() as u64;

        if new_size > size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size,
            });
        }

        data.truncate(new_size as usize);
        Ok(())
    }
}

/// External control over an [`InMemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    state: Arc<MemoryState>,
}

impl MemoryHandle {
    /// Takes the store offline. Every later operation fails with
    /// [`StorageError::Closed`].
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::Release);
    }

    /// Brings a closed store back online.
    pub fn reopen(&self) {
        self.state.closed.store(false, Ordering::Release);
    }

    /// Returns true if the store is offline.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.state.data.read().clone()
    }

    /// Returns the number of stored bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.data.read().len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops the last `count` bytes, simulating a write torn by a crash.
    pub fn cut_tail(&self, count: usize) {
        let mut data = self.state.data.write();
        let keep = data.len().saturating_sub(count);
        data.truncate(keep);
    }

    /// Flips every bit of the byte at `offset`. Out-of-range offsets are ignored.
    pub fn corrupt_byte(&self, offset: usize) {
        if let Some(byte) = self.state.data.write().get_mut(offset) {
            *byte = !*byte;
        }
    }
}
