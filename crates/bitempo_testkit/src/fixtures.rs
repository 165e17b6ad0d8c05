//! Test fixtures and node helpers.
//!
//! Provides convenience functions for setting up test nodes
//! and common test scenarios.

use bitempo_core::{Config, InMemoryIndex, ManualClock, Node, NodeBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// How long fixture helpers wait for the indexer.
pub const FIXTURE_WAIT: Duration = Duration::from_secs(10);

/// A test node wired to an [`InMemoryIndex`], with automatic cleanup.
pub struct TestNode {
    /// The node instance.
    pub node: Node,
    /// The index the node feeds.
    pub index: Arc<InMemoryIndex>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestNode {
    /// Creates a new in-memory test node.
    pub fn memory() -> Self {
        Self::memory_with(Config::default(), None)
    }

    /// Creates an in-memory test node with its own config and, optionally, a
    /// manual clock the test keeps a clone of.
    pub fn memory_with(config: Config, clock: Option<ManualClock>) -> Self {
        let index = Arc::new(InMemoryIndex::new());
        let node = builder(config, clock, &index)
            .open_in_memory()
            .expect("Failed to open in-memory node");
        Self {
            node,
            index,
            _temp_dir: None,
        }
    }

    /// Creates a new file-based test node in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let index = Arc::new(InMemoryIndex::new());
        let node = builder(Config::default(), None, &index)
            .open(&temp_dir.path().join("node"))
            .expect("Failed to open file node");
        Self {
            node,
            index,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the node directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join("node"))
    }

    /// Closes the node and opens the same directory again.
    ///
    /// The fresh index is rebuilt by replaying the log.
    ///
    /// # Panics
    ///
    /// Panics for in-memory nodes, which have nothing to reopen.
    pub fn reopen(self) -> Self {
        let Self {
            node,
            _temp_dir: temp_dir,
            ..
        } = self;
        let temp_dir = temp_dir.expect("Only file nodes can be reopened");
        node.close().expect("Failed to close node");
        drop(node);

        let index = Arc::new(InMemoryIndex::new());
        let node = builder(Config::default(), None, &index)
            .open(&temp_dir.path().join("node"))
            .expect("Failed to reopen file node");
        Self {
            node,
            index,
            _temp_dir: Some(temp_dir),
        }
    }
}

fn builder(config: Config, clock: Option<ManualClock>, index: &Arc<InMemoryIndex>) -> NodeBuilder {
    let builder = Node::builder().config(config).indexer(index.clone());
    match clock {
        Some(clock) => builder.clock(clock),
        None => builder,
    }
}

impl std::ops::Deref for TestNode {
    type Target = Node;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

/// Runs a test with a temporary in-memory node.
///
/// # Example
///
/// ```rust
/// use bitempo_testkit::with_temp_node;
///
/// with_temp_node(|node| {
///     assert_eq!(node.latest_submitted_tx(), None);
/// });
/// ```
pub fn with_temp_node<F, R>(f: F) -> R
where
    F: FnOnce(&Node) -> R,
{
    let test_node = TestNode::memory();
    f(&test_node.node)
}

/// Runs a test with a temporary file-based node.
pub fn with_file_node<F, R>(f: F) -> R
where
    F: FnOnce(&Node, &Path) -> R,
{
    let test_node = TestNode::file();
    let path = test_node.path().expect("File node should have a path");
    f(&test_node.node, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use bitempo_core::{
        Document, DocumentId, PutOperation, Transaction, TransactionInstant,
    };

    /// Creates a node holding `doc_count` distinct documents, one per transaction.
    ///
    /// Returns once the index has caught up.
    pub fn populated_node(doc_count: usize) -> TestNode {
        let test_node = TestNode::memory();
        for i in 0..doc_count {
            let doc = Document::create(DocumentId::from(format!("doc-{i}")))
                .plus("index", i as i64)
                .expect("Failed to build document");
            test_node
                .submit_tx(&Transaction::single(PutOperation::create(doc)))
                .expect("Failed to submit");
        }
        test_node.sync(FIXTURE_WAIT).expect("Failed to sync");
        test_node
    }

    /// Writes `versions` successive versions of `:myDoc`.
    ///
    /// Version `n` carries `{:version n}`; the returned instants are in
    /// submission order.
    pub fn versioned_document(versions: usize) -> (TestNode, Vec<TransactionInstant>) {
        let test_node = TestNode::memory();
        let mut instants = Vec::with_capacity(versions);
        for version in 1..=versions {
            let doc = Document::create(DocumentId::keyword("myDoc"))
                .plus("version", version as i64)
                .expect("Failed to build document");
            instants.push(
                test_node
                    .submit_tx(&Transaction::single(PutOperation::create(doc)))
                    .expect("Failed to submit"),
            );
        }
        test_node.sync(FIXTURE_WAIT).expect("Failed to sync");
        (test_node, instants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitempo_core::{
        Document, DocumentId, PutOperation, Timestamp, Transaction, TransactionId,
    };

    #[test]
    fn test_memory_node() {
        let test_node = TestNode::memory();
        assert!(test_node.is_open());
        assert!(test_node.path().is_none());
    }

    #[test]
    fn test_with_temp_node() {
        let instant = with_temp_node(|node| node.submit_tx(&Transaction::default()).unwrap());
        assert_eq!(instant.tx_id, TransactionId::new(1));
    }

    #[test]
    fn test_with_file_node() {
        with_file_node(|node, path| {
            node.submit_tx(&Transaction::default()).unwrap();
            assert!(path.join("tx.log").exists());
        });
    }

    #[test]
    fn test_memory_with_clock() {
        let clock = ManualClock::new(Timestamp::from_millis(7));
        let test_node = TestNode::memory_with(Config::default(), Some(clock.clone()));
        let instant = test_node.submit_tx(&Transaction::default()).unwrap();
        assert_eq!(instant.tx_time, Timestamp::from_millis(7));

        clock.set(Timestamp::from_millis(20));
        let later = test_node.submit_tx(&Transaction::default()).unwrap();
        assert_eq!(later.tx_time, Timestamp::from_millis(20));
    }

    #[test]
    fn test_reopen_replays_into_fresh_index() {
        let test_node = TestNode::file();
        let instant = test_node
            .submit_tx(&Transaction::single(PutOperation::create(Document::create(
                DocumentId::keyword("myDoc"),
            ))))
            .unwrap();

        let test_node = test_node.reopen();
        test_node.sync(FIXTURE_WAIT).unwrap();
        assert_eq!(test_node.latest_submitted_tx(), Some(instant));
        assert_eq!(test_node.index.history(&DocumentId::keyword("myDoc")).len(), 1);
    }

    #[test]
    fn test_populated_scenario() {
        let test_node = scenarios::populated_node(10);
        assert_eq!(test_node.index.document_count(), 10);
        assert_eq!(test_node.document_count(), 10);
    }

    #[test]
    fn test_versioned_scenario() {
        let (test_node, instants) = scenarios::versioned_document(3);
        assert_eq!(instants.len(), 3);
        assert_eq!(test_node.index.history(&DocumentId::keyword("myDoc")).len(), 3);
    }
}
