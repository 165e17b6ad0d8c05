//! Node facade and recovery.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
#[cfg(feature = "std")]
use crate::dir::NodeDir;
use crate::docstore::{DocumentStore, StoreMark};
use crate::document::{ContentHash, Document};
use crate::error::{CoreError, CoreResult};
use crate::index::{IndexSender, IndexedTx, Indexer, IndexingWorker, InMemoryIndex};
use crate::log::{LogEntry, LoggedOperation, Sequencer, TxLog, TxLogEntry};
use crate::sync::{SyncCoordinator, WaitCancellation, Watermark};
use crate::tx::{Transaction, TransactionOperation};
use crate::types::{TransactionId, TransactionInstant};
use bitempo_storage::{InMemoryBackend, StorageBackend};
use parking_lot::{Mutex, RwLock};
#[cfg(feature = "std")]
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// State touched by every submission, guarded as one unit.
struct Pipeline {
    log: TxLog,
    sequencer: Sequencer,
    /// `None` once the node is closed.
    sender: Option<IndexSender>,
}

/// A bitemporal document node.
///
/// `Node` accepts transactions into a durable log and hands each one to an
/// [`Indexer`] on a background thread. Submission returns as soon as the
/// entry is durable; callers that need to read their own writes wait with
/// [`Node::await_tx`] or [`Node::sync`].
///
/// # Opening a Node
///
/// ```rust,no_run
/// use bitempo_core::{Document, DocumentId, Node, PutOperation, Transaction};
/// use std::path::Path;
/// use std::time::Duration;
///
/// let node = Node::open(Path::new("my_node"))?;
///
/// let doc = Document::create(DocumentId::keyword("myDoc")).plus("version", 1)?;
/// let instant = node.submit_tx(&Transaction::single(PutOperation::create(doc)))?;
/// node.await_tx(instant, Duration::from_secs(5))?;
///
/// node.close()?;
/// # Ok::<(), bitempo_core::CoreError>(())
/// ```
///
/// `Node` is `Send + Sync`; share it behind an `Arc` to submit and wait from
/// several threads.
pub struct Node {
    config: Config,
    /// Holds the directory lock. None for nodes over caller-supplied backends.
    #[cfg(feature = "std")]
    _dir: Option<NodeDir>,
    pipeline: Mutex<Pipeline>,
    documents: DocumentStore,
    coordinator: SyncCoordinator,
    worker: Mutex<IndexingWorker>,
    is_open: RwLock<bool>,
}

impl Node {
    /// Opens a node from a directory path with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeLocked`] if another process has the node
    /// open, or an error if the stored data cannot be recovered.
    #[cfg(feature = "std")]
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::builder().open(path)
    }

    /// Opens a node from a directory path with custom configuration.
    ///
    /// # Errors
    ///
    /// As [`Node::open`].
    #[cfg(feature = "std")]
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        Self::builder().config(config).open(path)
    }

    /// Opens a fresh node that keeps everything in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the indexing thread cannot be started.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::builder().open_in_memory()
    }

    /// Opens a node over caller-supplied backends and indexer.
    ///
    /// Whatever the backends already hold is recovered and replayed into
    /// `indexer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored data cannot be recovered.
    pub fn open_with_backends(
        config: Config,
        log_backend: Box<dyn StorageBackend>,
        doc_backend: Box<dyn StorageBackend>,
        indexer: Arc<dyn Indexer>,
    ) -> CoreResult<Self> {
        Self::builder()
            .config(config)
            .indexer(indexer)
            .open_with_backends(log_backend, doc_backend)
    }

    /// Starts configuring a node.
    #[must_use]
    pub fn builder() -> NodeBuilder {
        NodeBuilder::default()
    }

    fn start(
        builder: NodeBuilder,
        log_backend: Box<dyn StorageBackend>,
        doc_backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        let NodeBuilder {
            config,
            clock,
            indexer,
        } = builder;
        let indexer = indexer.unwrap_or_else(|| Arc::new(InMemoryIndex::new()));

        let documents = DocumentStore::open(doc_backend, config.sync_on_submit)?;
        let (log, recovery) =
            TxLog::open(log_backend, config.sync_on_submit, config.max_entry_size)?;

        let last = recovery.entries.last().map(|entry| entry.instant);
        let sequencer = Sequencer::resume(clock, last);

        let watermark = Arc::new(Watermark::new());
        let coordinator = SyncCoordinator::new(Arc::clone(&watermark));
        let (worker, sender) =
            IndexingWorker::spawn(indexer, watermark)?;

        let replayed = recovery.entries.len();
        for entry in &recovery.entries {
            let tx = IndexedTx {
                instant: entry.instant,
                operations: resolve_operations(&documents, entry)?,
            };
            coordinator.record_submitted(entry.instant);
            if sender.send(tx).is_err() {
                warn!(
                    target: "bitempo::node",
                    tx_id = entry.instant.tx_id.as_u64(),
                    "indexing engine stopped during replay"
                );
                break;
            }
        }

        info!(
            target: "bitempo::node",
            replayed,
            truncated_bytes = recovery.truncated_bytes,
            next_tx_id = sequencer.next_id().as_u64(),
            "node opened"
        );

        Ok(Self {
            config,
            #[cfg(feature = "std")]
            _dir: None,
            pipeline: Mutex::new(Pipeline {
                log,
                sequencer,
                sender: Some(sender),
            }),
            documents,
            coordinator,
            worker: Mutex::new(worker),
            is_open: RwLock::new(true),
        })
    }

    /// Records a transaction and queues it for indexing.
    ///
    /// Document bodies are stored first, then the entry is appended to the
    /// log as one frame. The call returns once the entry is durable, without
    /// waiting for the indexer.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SubmissionFailed`] if the node is closed, the
    /// indexing backlog is at [`Config::max_index_backlog`], or a write fails.
    /// A failed submission consumes no transaction id and leaves no document
    /// bodies behind.
    pub fn submit_tx(&self, tx: &Transaction) -> CoreResult<TransactionInstant> {
        let is_open = self.is_open.read();
        if !*is_open {
            return Err(CoreError::submission_failed("node is closed"));
        }

        let operations = tx
            .operations()
            .iter()
            .map(LoggedOperation::from_operation)
            .collect();

        let mut pipeline = self.pipeline.lock();
        self.check_backlog()?;

        // deletes-only transactions never touch the document store
        let mark = match tx.documents().next() {
            Some(_) => Some(self.documents.mark().map_err(|e| {
                CoreError::submission_failed(format!("document store unavailable: {e}"))
            })?),
            None => None,
        };
        let appended = tx
            .documents()
            .try_for_each(|document| {
                self.documents.put(document).map(drop).map_err(|e| {
                    CoreError::submission_failed(format!(
                        "cannot store document {}: {e}",
                        document.id()
                    ))
                })
            })
            .and_then(|()| {
                let instant = pipeline.sequencer.propose();
                pipeline.log.append(&LogEntry {
                    instant,
                    operations,
                })?;
                Ok(instant)
            });
        let instant = match appended {
            Ok(instant) => instant,
            Err(e) => {
                if let Some(mark) = mark {
                    self.discard_bodies(mark);
                }
                return Err(e);
            }
        };
        pipeline.sequencer.commit(instant);
        self.coordinator.record_submitted(instant);

        if let Some(sender) = &pipeline.sender {
            let indexed = IndexedTx {
                instant,
                operations: tx.operations().to_vec(),
            };
            if sender.send(indexed).is_err() {
                // the entry is durable; it will be indexed on the next open
                warn!(
                    target: "bitempo::node",
                    tx_id = instant.tx_id.as_u64(),
                    "indexing engine stopped, transaction logged but not indexed"
                );
            }
        }
        drop(pipeline);

        debug!(
            target: "bitempo::node",
            tx_id = instant.tx_id.as_u64(),
            tx_time = instant.tx_time.as_millis(),
            ops = tx.len(),
            "submitted transaction"
        );
        Ok(instant)
    }

    /// Refuses new work while too many logged transactions wait for the
    /// indexer. Called with the pipeline held.
    fn check_backlog(&self) -> CoreResult<()> {
        let limit = self.config.max_index_backlog;
        if limit == 0 {
            return Ok(());
        }
        let submitted = self
            .coordinator
            .latest_submitted()
            .map_or(0, |instant| instant.tx_id.as_u64());
        let indexed = self
            .coordinator
            .current_watermark()
            .map_or(0, TransactionId::as_u64);
        let backlog = submitted.saturating_sub(indexed);
        if backlog >= limit as u64 {
            debug!(target: "bitempo::node", backlog, limit, "indexing backlog full");
            return Err(CoreError::submission_failed(format!(
                "indexing backlog full: {backlog} transactions not yet indexed"
            )));
        }
        Ok(())
    }

    /// Drops bodies stored by a submission that never reached the log.
    fn discard_bodies(&self, mark: StoreMark) {
        match self.documents.rollback(mark) {
            Ok(0) => {}
            Ok(dropped) => {
                debug!(target: "bitempo::node", dropped, "discarded bodies of failed submission");
            }
            Err(e) => warn!(
                target: "bitempo::node",
                error = %e,
                "cannot cut bodies of failed submission off the document store"
            ),
        }
    }

    /// Blocks until `instant` is indexed, then returns it.
    ///
    /// # Errors
    ///
    /// - [`CoreError::SyncTimeout`] if the indexer has not reached it in time
    /// - [`CoreError::EngineUnavailable`] if indexing stopped or the node closed
    pub fn await_tx(
        &self,
        instant: TransactionInstant,
        timeout: Duration,
    ) -> CoreResult<TransactionInstant> {
        self.coordinator.await_tx(instant, timeout)
    }

    /// Blocks until `tx_id` is indexed and returns the latest indexed
    /// transaction.
    ///
    /// # Errors
    ///
    /// As [`Node::await_tx`].
    pub fn await_tx_id(
        &self,
        tx_id: TransactionId,
        timeout: Duration,
    ) -> CoreResult<TransactionInstant> {
        self.coordinator.await_tx_id(tx_id, timeout)
    }

    /// Like [`Node::await_tx`], but `cancel` can abort the wait early.
    ///
    /// # Errors
    ///
    /// As [`Node::await_tx`], plus [`CoreError::WaitCancelled`].
    pub fn await_tx_cancellable(
        &self,
        instant: TransactionInstant,
        timeout: Duration,
        cancel: &WaitCancellation,
    ) -> CoreResult<TransactionInstant> {
        self.coordinator.await_tx_cancellable(instant, timeout, cancel)
    }

    /// Blocks until every transaction submitted before the call is indexed.
    ///
    /// Returns the latest submitted transaction at the time of the call, or
    /// `None` if nothing was ever submitted.
    ///
    /// # Errors
    ///
    /// As [`Node::await_tx`].
    pub fn sync(&self, timeout: Duration) -> CoreResult<Option<TransactionInstant>> {
        self.coordinator.sync(timeout)
    }

    /// [`Node::sync`] with the configured default timeout.
    ///
    /// # Errors
    ///
    /// As [`Node::await_tx`].
    pub fn sync_default(&self) -> CoreResult<Option<TransactionInstant>> {
        self.sync(self.config.default_sync_timeout)
    }

    /// Returns the latest transaction accepted by the log.
    pub fn latest_submitted_tx(&self) -> Option<TransactionInstant> {
        self.coordinator.latest_submitted()
    }

    /// Returns the latest transaction the indexer has applied.
    pub fn latest_completed_tx(&self) -> Option<TransactionInstant> {
        self.coordinator.latest_completed()
    }

    /// Returns the id of the latest transaction the indexer has applied.
    pub fn current_watermark(&self) -> Option<TransactionId> {
        self.coordinator.current_watermark()
    }

    /// Reads the log entries with id greater than `after`, in id order.
    ///
    /// With `with_ops` each entry carries its operations, document bodies
    /// included.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NodeClosed`] after close, or an error if the log
    /// or document store cannot be read.
    pub fn open_tx_log(
        &self,
        after: Option<TransactionId>,
        with_ops: bool,
    ) -> CoreResult<Vec<TxLogEntry>> {
        self.ensure_open()?;
        let entries = self.pipeline.lock().log.entries_after(after)?;

        entries
            .into_iter()
            .map(|entry| {
                let operations = if with_ops {
                    Some(resolve_operations(&self.documents, &entry)?)
                } else {
                    None
                };
                Ok(TxLogEntry {
                    instant: entry.instant,
                    operations,
                })
            })
            .collect()
    }

    /// Loads a stored document body by content hash.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DocumentNotFound`] if no such body was submitted,
    /// or [`CoreError::NodeClosed`] after close.
    pub fn document(&self, hash: &ContentHash) -> CoreResult<Document> {
        self.ensure_open()?;
        self.documents.get(hash)
    }

    /// Returns the number of distinct document bodies stored.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Closes the node.
    ///
    /// Queued transactions are indexed before the worker stops. Afterwards
    /// submissions fail with [`CoreError::SubmissionFailed`] and waits that
    /// are not yet satisfied fail with [`CoreError::EngineUnavailable`].
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails; the node is closed anyway.
    pub fn close(&self) -> CoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }
        *is_open = false;

        let log_result = {
            let mut pipeline = self.pipeline.lock();
            pipeline.sender = None;
            pipeline.log.close()
        };
        self.worker.lock().join();
        self.coordinator.watermark().fail("node closed");
        let docs_result = self.documents.flush();

        info!(
            target: "bitempo::node",
            latest_submitted = ?self.latest_submitted_tx().map(|i| i.tx_id.as_u64()),
            watermark = ?self.current_watermark().map(TransactionId::as_u64),
            "node closed"
        );
        log_result.and(docs_result)
    }

    /// Returns true until [`Node::close`] is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Returns the node configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::NodeClosed)
        }
    }
}

fn resolve_operations(
    documents: &DocumentStore,
    entry: &LogEntry,
) -> CoreResult<Vec<TransactionOperation>> {
    entry
        .operations
        .iter()
        .map(|op| {
            op.resolve(|hash| {
                documents.get(hash).map_err(|e| match e {
                    CoreError::DocumentNotFound { hash } => CoreError::log_corruption(format!(
                        "{} references missing document {hash}",
                        entry.instant.tx_id
                    )),
                    other => other,
                })
            })
        })
        .collect()
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("is_open", &self.is_open())
            .field("latest_submitted", &self.latest_submitted_tx())
            .field("watermark", &self.current_watermark())
            .finish_non_exhaustive()
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(target: "bitempo::node", error = %e, "error closing node");
        }
    }
}

/// Configures and opens a [`Node`].
///
/// ```rust
/// use bitempo_core::{Config, InMemoryIndex, Node};
/// use std::sync::Arc;
///
/// let index = Arc::new(InMemoryIndex::new());
/// let node = Node::builder()
///     .config(Config::default().sync_on_submit(false))
///     .indexer(index.clone())
///     .open_in_memory()
///     .unwrap();
/// assert!(node.is_open());
/// ```
pub struct NodeBuilder {
    config: Config,
    clock: Arc<dyn Clock>,
    indexer: Option<Arc<dyn Indexer>>,
}

impl Default for NodeBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            clock: Arc::new(SystemClock),
            indexer: None,
        }
    }
}

impl NodeBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the clock that supplies transaction times.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Sets the indexer. Defaults to a fresh [`InMemoryIndex`].
    #[must_use]
    pub fn indexer(mut self, indexer: Arc<dyn Indexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    /// Opens a node in `path`, creating it if the configuration allows.
    ///
    /// # Errors
    ///
    /// As [`Node::open`].
    #[cfg(feature = "std")]
    pub fn open(self, path: &Path) -> CoreResult<Node> {
        use bitempo_storage::FileBackend;

        let dir = NodeDir::open(path, self.config.create_if_missing)?;
        let log_backend = FileBackend::open(&dir.log_path())?;
        let doc_backend = FileBackend::open(&dir.docs_path())?;
        let mut node = Node::start(self, Box::new(log_backend), Box::new(doc_backend))?;
        node._dir = Some(dir);
        Ok(node)
    }

    /// Opens a node held entirely in memory.
    ///
    /// # Errors
    ///
    /// As [`Node::open_in_memory`].
    pub fn open_in_memory(self) -> CoreResult<Node> {
        self.open_with_backends(
            Box::new(InMemoryBackend::new()),
            Box::new(InMemoryBackend::new()),
        )
    }

    /// Opens a node over caller-supplied backends.
    ///
    /// # Errors
    ///
    /// As [`Node::open_with_backends`].
    pub fn open_with_backends(
        self,
        log_backend: Box<dyn StorageBackend>,
        doc_backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Node> {
        Node::start(self, log_backend, doc_backend)
    }
}
