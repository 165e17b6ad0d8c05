//! The hand-off from the log to the indexing engine.
//!
//! Every accepted transaction is delivered, in id order, to an [`Indexer`]
//! running on a dedicated worker thread. After the indexer applies an entry
//! the worker advances the [`Watermark`](crate::sync::Watermark). If the
//! indexer fails, the worker stops and the watermark is poisoned.

mod memory;
mod worker;

pub use memory::{DocumentVersion, InMemoryIndex, VersionContent};
pub(crate) use worker::{IndexSender, IndexingWorker};

use crate::error::CoreResult;
use crate::tx::TransactionOperation;
use crate::types::TransactionInstant;

/// A transaction as handed to the indexer, document bodies included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedTx {
    /// Where the log placed the transaction.
    pub instant: TransactionInstant,
    /// The operations, in submission order.
    pub operations: Vec<TransactionOperation>,
}

/// Applies transactions to some queryable state.
///
/// Implementations see each transaction exactly once per node lifetime, in
/// strictly increasing id order. On reopen the node replays the whole log
/// into a fresh worker, so an indexer that keeps durable state of its own must
/// tolerate seeing entries it already applied.
///
/// Returning an error stops indexing for the life of the node.
pub trait Indexer: Send + Sync {
    /// Applies one transaction.
    ///
    /// # Errors
    ///
    /// Any error is fatal to the indexing engine.
    fn index_tx(&self, tx: &IndexedTx) -> CoreResult<()>;
}

impl<T: Indexer + ?Sized> Indexer for std::sync::Arc<T> {
    fn index_tx(&self, tx: &IndexedTx) -> CoreResult<()> {
        (**self).index_tx(tx)
    }
}
