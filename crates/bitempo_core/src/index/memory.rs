//! A bitemporal index held in memory.

use crate::document::{ContentHash, Document, DocumentId};
use crate::error::CoreResult;
use crate::index::{IndexedTx, Indexer};
use crate::tx::{ResolvedRange, TransactionOperation};
use crate::types::{Timestamp, TransactionId, TransactionInstant};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// What a version says about its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionContent {
    /// The document had this body.
    Document(ContentHash),
    /// The document did not exist.
    Tombstone,
}

/// One recorded assertion about a document over a valid-time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentVersion {
    /// Valid-time interval the version covers.
    pub valid: ResolvedRange,
    /// Transaction that recorded it.
    pub instant: TransactionInstant,
    /// Position of the operation within its transaction.
    pub op_index: usize,
    /// Body or tombstone.
    pub content: VersionContent,
}

impl DocumentVersion {
    fn recorded_order(&self) -> (Timestamp, TransactionId, usize) {
        (self.instant.tx_time, self.instant.tx_id, self.op_index)
    }
}

#[derive(Default)]
struct IndexState {
    versions: HashMap<DocumentId, Vec<DocumentVersion>>,
    bodies: HashMap<ContentHash, Document>,
    indexed_through: Option<TransactionId>,
}

/// Reference [`Indexer`] answering point-in-time lookups.
///
/// For every document id the index keeps each version ever recorded. A
/// lookup at `(valid_time, tx_time)` considers the versions recorded at or
/// before `tx_time` whose valid interval contains `valid_time`, and picks the
/// one recorded last. Later operations in the same transaction win over
/// earlier ones.
#[derive(Default)]
pub struct InMemoryIndex {
    state: RwLock<IndexState>,
    delay: Option<Duration>,
}

impl InMemoryIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an index that sleeps for `delay` before applying each
    /// transaction.
    #[must_use]
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Looks up `id` as it was valid at `valid_time`, as known at `tx_time`.
    ///
    /// `None` for `tx_time` means as currently known.
    pub fn document_at(
        &self,
        id: &DocumentId,
        valid_time: Timestamp,
        tx_time: Option<Timestamp>,
    ) -> Option<Document> {
        let state = self.state.read();
        let version = state
            .versions
            .get(id)?
            .iter()
            .filter(|v| tx_time.is_none_or(|t| v.instant.tx_time <= t))
            .filter(|v| v.valid.contains(valid_time))
            .max_by_key(|v| v.recorded_order())?;

        match version.content {
            VersionContent::Document(hash) => state.bodies.get(&hash).cloned(),
            VersionContent::Tombstone => None,
        }
    }

    /// Returns every version recorded for `id`, oldest first.
    pub fn history(&self, id: &DocumentId) -> Vec<DocumentVersion> {
        self.state
            .read()
            .versions
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the highest transaction applied.
    pub fn indexed_through(&self) -> Option<TransactionId> {
        self.state.read().indexed_through
    }

    /// Returns the number of distinct document ids seen.
    pub fn document_count(&self) -> usize {
        self.state.read().versions.len()
    }
}

impl std::fmt::Debug for InMemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("InMemoryIndex")
            .field("indexed_through", &state.indexed_through)
            .field("documents", &state.versions.len())
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl Indexer for InMemoryIndex {
    fn index_tx(&self, tx: &IndexedTx) -> CoreResult<()> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state.write();
        for (op_index, op) in tx.operations.iter().enumerate() {
            let Some(valid) = op.valid_time().resolve(tx.instant.tx_time) else {
                warn!(
                    target: "bitempo::index",
                    tx_id = tx.instant.tx_id.as_u64(),
                    id = %op.document_id(),
                    "valid-time range is empty at transaction time, skipping operation"
                );
                continue;
            };

            let content = match op {
                TransactionOperation::Put(put) => {
                    let hash = put.document.content_hash();
                    state
                        .bodies
                        .entry(hash)
                        .or_insert_with(|| put.document.clone());
                    VersionContent::Document(hash)
                }
                TransactionOperation::Delete(_) => VersionContent::Tombstone,
            };

            state
                .versions
                .entry(op.document_id().clone())
                .or_default()
                .push(DocumentVersion {
                    valid,
                    instant: tx.instant,
                    op_index,
                    content,
                });
        }
        state.indexed_through = Some(tx.instant.tx_id);
        Ok(())
    }
}
