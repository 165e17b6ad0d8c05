//! The indexing worker thread.

use crate::error::CoreResult;
use crate::index::{IndexedTx, Indexer};
use crate::sync::Watermark;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

const THREAD_NAME: &str = "bitempo-indexer";

/// Sending half of the indexing queue.
///
/// The queue is unbounded so handing off never blocks a submitter; the node
/// limits how far indexing may fall behind before the hand-off.
pub(crate) type IndexSender = Sender<IndexedTx>;

/// Owns the thread that feeds queued transactions to the indexer.
pub(crate) struct IndexingWorker {
    handle: Option<JoinHandle<()>>,
}

impl IndexingWorker {
    /// Starts the worker.
    pub(crate) fn spawn(
        indexer: Arc<dyn Indexer>,
        watermark: Arc<Watermark>,
    ) -> CoreResult<(Self, IndexSender)> {
        let (sender, receiver) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(indexer.as_ref(), &watermark, receiver))?;

        Ok((
            Self {
                handle: Some(handle),
            },
            sender,
        ))
    }

    /// Waits for the worker to exit.
    ///
    /// The worker exits once every [`IndexSender`] is dropped and the queue
    /// is drained, or after the indexer fails.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(target: "bitempo::index", "indexing worker panicked");
            }
        }
    }
}

/// Poisons the watermark if the indexer panics.
struct FailOnPanic<'a> {
    watermark: &'a Watermark,
}

impl Drop for FailOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(target: "bitempo::index", "indexer panicked, stopping indexing");
            self.watermark.fail("indexer panicked");
        }
    }
}

fn run(indexer: &dyn Indexer, watermark: &Watermark, receiver: Receiver<IndexedTx>) {
    let _guard = FailOnPanic { watermark };

    for tx in receiver {
        let tx_id = tx.instant.tx_id;
        match indexer.index_tx(&tx) {
            Ok(()) => {
                watermark.advance(tx.instant);
                debug!(target: "bitempo::index", tx_id = tx_id.as_u64(), "indexed transaction");
            }
            Err(e) => {
                error!(
                    target: "bitempo::index",
                    tx_id = tx_id.as_u64(),
                    error = %e,
                    "indexer failed, stopping indexing"
                );
                watermark.fail(format!("indexer failed at {tx_id}: {e}"));
                return;
            }
        }
    }
    debug!(target: "bitempo::index", "indexing queue closed");
}
