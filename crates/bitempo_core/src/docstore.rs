//! Content-addressed document bodies.
//!
//! Bodies are appended once per distinct [`ContentHash`]; submitting the same
//! document again stores nothing new. An in-memory map from hash to file
//! offset is rebuilt by scanning the file on open.

use crate::document::{ContentHash, Document};
use crate::error::{CoreError, CoreResult};
use crate::frame::{FrameFormat, HEADER_SIZE};
use bitempo_storage::StorageBackend;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct Location {
    offset: u64,
    len: usize,
}

/// A point in the store's history that [`DocumentStore::rollback`] returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreMark(u64);

/// Stores document bodies keyed by content hash.
pub struct DocumentStore {
    backend: Mutex<Box<dyn StorageBackend>>,
    index: RwLock<HashMap<ContentHash, Location>>,
    sync_on_write: bool,
}

impl DocumentStore {
    /// Opens a store over `backend`, indexing what it already holds.
    ///
    /// A torn tail is truncated away.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is corrupted or the backend fails.
    pub fn open(mut backend: Box<dyn StorageBackend>, sync_on_write: bool) -> CoreResult<Self> {
        let mut index = HashMap::new();

        let (valid_end, total_size) = {
            let mut frames = FrameFormat::DOC_STORE.frames(backend.as_ref(), 0)?;
            for frame in frames.by_ref() {
                let frame = frame?;
                index.insert(
                    ContentHash::of(&frame.payload),
                    Location {
                        offset: frame.offset + HEADER_SIZE as u64,
                        len: frame.payload.len(),
                    },
                );
            }
            (frames.valid_end(), frames.total_size())
        };

        if valid_end < total_size {
            warn!(
                target: "bitempo::docstore",
                offset = valid_end,
                bytes = total_size - valid_end,
                "discarding torn tail of document store"
            );
            backend.truncate(valid_end)?;
        }

        Ok(Self {
            backend: Mutex::new(backend),
            index: RwLock::new(index),
            sync_on_write,
        })
    }

    /// Stores `document` unless a body with the same hash is already present.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be encoded or written.
    pub fn put(&self, document: &Document) -> CoreResult<ContentHash> {
        let bytes = bitempo_codec::to_canonical_cbor(&document.to_value())?;
        let hash = ContentHash::of(&bytes);

        if self.index.read().contains_key(&hash) {
            return Ok(hash);
        }

        let frame = FrameFormat::DOC_STORE.encode(&bytes)?;
        let mut backend = self.backend.lock();
        // another writer may have stored it while we encoded
        if self.index.read().contains_key(&hash) {
            return Ok(hash);
        }

        let offset = backend.append(&frame)?;
        if self.sync_on_write {
            backend.sync()?;
        } else {
            backend.flush()?;
        }

        self.index.write().insert(
            hash,
            Location {
                offset: offset + HEADER_SIZE as u64,
                len: bytes.len(),
            },
        );
        debug!(target: "bitempo::docstore", %hash, bytes = bytes.len(), "stored document");
        Ok(hash)
    }

    /// Returns a mark for the store as it is now.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn mark(&self) -> CoreResult<StoreMark> {
        Ok(StoreMark(self.backend.lock().size()?))
    }

    /// Forgets every body stored after `mark` and cuts them off the backend.
    ///
    /// Bodies stored before `mark` are untouched. The caller must make sure no
    /// body written since `mark` is still wanted. Returns how many bodies were
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be truncated. The bodies are no
    /// longer visible through this store either way.
    pub fn rollback(&self, mark: StoreMark) -> CoreResult<usize> {
        let mut backend = self.backend.lock();
        let dropped = {
            let mut index = self.index.write();
            let before = index.len();
            index.retain(|_, location| location.offset < mark.0);
            before - index.len()
        };
        if backend.size()? > mark.0 {
            backend.truncate(mark.0)?;
            if self.sync_on_write {
                backend.sync()?;
            }
        }
        debug!(target: "bitempo::docstore", offset = mark.0, dropped, "rolled back document store");
        Ok(dropped)
    }

    /// Loads the document stored under `hash`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DocumentNotFound`] if no such body is stored.
    pub fn get(&self, hash: &ContentHash) -> CoreResult<Document> {
        let location = self
            .index
            .read()
            .get(hash)
            .copied()
            .ok_or_else(|| CoreError::DocumentNotFound {
                hash: hash.to_hex(),
            })?;

        let bytes = self.backend.lock().read_at(location.offset, location.len)?;
        let value = bitempo_codec::from_cbor(&bytes)?;
        Document::from_value(&value)
    }

    /// Returns true if a body with `hash` is stored.
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.index.read().contains_key(hash)
    }

    /// Returns the number of distinct bodies stored.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Returns the bytes used on the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Flushes buffered writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend flush fails.
    pub fn flush(&self) -> CoreResult<()> {
        self.backend.lock().flush()?;
        Ok(())
    }
}
