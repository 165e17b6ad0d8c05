//! Waiting for the indexer: timeouts, failures, cancellation and close.

use bitempo_core::{
    Config, CoreError, CoreResult, Document, DocumentId, IndexedTx, Indexer, InMemoryIndex, Node,
    PutOperation, Transaction, TransactionId, WaitCancellation,
};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(10);

fn put(version: i64) -> Transaction {
    Transaction::single(PutOperation::create(
        Document::create(DocumentId::keyword("myDoc"))
            .plus("version", version)
            .unwrap(),
    ))
}

fn node_with(indexer: Arc<dyn Indexer>) -> Node {
    Node::builder().indexer(indexer).open_in_memory().unwrap()
}

/// Fails on one transaction id, succeeds otherwise.
struct FailingIndexer {
    fail_at: TransactionId,
}

impl Indexer for FailingIndexer {
    fn index_tx(&self, tx: &IndexedTx) -> CoreResult<()> {
        if tx.instant.tx_id == self.fail_at {
            return Err(CoreError::invalid_operation("disk full"));
        }
        Ok(())
    }
}

/// Holds every transaction until opened.
#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    fn release(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }
}

impl Indexer for Gate {
    fn index_tx(&self, _tx: &IndexedTx) -> CoreResult<()> {
        let mut open = self.open.lock();
        while !*open {
            self.opened.wait(&mut open);
        }
        Ok(())
    }
}

#[test]
fn await_times_out_behind_slow_indexer() {
    let node = node_with(Arc::new(InMemoryIndex::with_delay(Duration::from_millis(300))));
    let instant = node.submit_tx(&put(1)).unwrap();

    let started = Instant::now();
    let err = node
        .await_tx(instant, Duration::from_millis(20))
        .unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(20));
    assert!(err.is_retryable());
    match err {
        CoreError::SyncTimeout {
            tx_id, watermark, ..
        } => {
            assert_eq!(tx_id, instant.tx_id);
            assert_eq!(watermark, None);
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    // the same wait succeeds once the indexer catches up
    assert_eq!(node.await_tx(instant, WAIT).unwrap(), instant);
}

#[test]
fn sync_covers_everything_submitted_before_it() {
    let node = node_with(Arc::new(InMemoryIndex::with_delay(Duration::from_millis(5))));
    let mut last = None;
    for version in 0..10 {
        last = Some(node.submit_tx(&put(version)).unwrap());
    }

    let synced = node.sync(WAIT).unwrap();
    assert_eq!(synced, last);
    assert_eq!(node.latest_completed_tx(), last);
}

#[test]
fn sync_default_uses_configured_timeout() {
    let gate = Arc::new(Gate::default());
    let node = Node::builder()
        .config(Config::default().default_sync_timeout(Duration::from_millis(20)))
        .indexer(gate.clone())
        .open_in_memory()
        .unwrap();

    node.submit_tx(&put(1)).unwrap();
    assert!(matches!(
        node.sync_default(),
        Err(CoreError::SyncTimeout { .. })
    ));

    gate.release();
    assert!(node.sync(WAIT).unwrap().is_some());
}

#[test]
fn await_tx_id_reports_latest_indexed() {
    let node = Node::open_in_memory().unwrap();
    node.submit_tx(&put(1)).unwrap();
    let second = node.submit_tx(&put(2)).unwrap();
    node.sync(WAIT).unwrap();

    let reached = node.await_tx_id(TransactionId::new(1), WAIT).unwrap();
    assert_eq!(reached, second);
}

#[test]
fn indexer_failure_releases_waiters() {
    let node = Arc::new(node_with(Arc::new(FailingIndexer {
        fail_at: TransactionId::new(2),
    })));
    let first = node.submit_tx(&put(1)).unwrap();
    node.await_tx(first, WAIT).unwrap();

    let waiter = {
        let node = Arc::clone(&node);
        thread::spawn(move || node.await_tx_id(TransactionId::new(3), WAIT))
    };

    let second = node.submit_tx(&put(2)).unwrap();
    let err = node.await_tx(second, WAIT).unwrap_err();
    assert!(matches!(err, CoreError::EngineUnavailable { ref reason } if reason.contains("disk full")));
    assert!(!err.is_retryable());

    assert!(matches!(
        waiter.join().unwrap(),
        Err(CoreError::EngineUnavailable { .. })
    ));

    // the log still accepts transactions; they are indexed on the next open
    let third = node.submit_tx(&put(3)).unwrap();
    assert_eq!(third.tx_id, TransactionId::new(3));
    assert_eq!(node.current_watermark(), Some(TransactionId::new(1)));
}

#[test]
fn cancelling_a_wait_leaves_indexing_alone() {
    let gate = Arc::new(Gate::default());
    let node = Arc::new(node_with(gate.clone()));
    let instant = node.submit_tx(&put(1)).unwrap();
    let token = WaitCancellation::new();

    let waiter = {
        let node = Arc::clone(&node);
        let token = token.clone();
        thread::spawn(move || node.await_tx_cancellable(instant, WAIT, &token))
    };

    thread::sleep(Duration::from_millis(20));
    token.cancel();
    assert!(matches!(
        waiter.join().unwrap(),
        Err(CoreError::WaitCancelled { .. })
    ));

    gate.release();
    assert_eq!(node.await_tx(instant, WAIT).unwrap(), instant);

    // an indexed transaction satisfies the wait even with a cancelled token
    assert!(node
        .await_tx_cancellable(instant, WAIT, &WaitCancellation::new())
        .is_ok());
    assert!(node.await_tx_cancellable(instant, WAIT, &token).is_ok());
}

#[test]
fn close_releases_waiters() {
    let node = Arc::new(Node::open_in_memory().unwrap());
    let waiters: Vec<_> = (1..=3)
        .map(|id| {
            let node = Arc::clone(&node);
            thread::spawn(move || node.await_tx_id(TransactionId::new(id), WAIT))
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    node.close().unwrap();

    for waiter in waiters {
        assert!(matches!(
            waiter.join().unwrap(),
            Err(CoreError::EngineUnavailable { .. })
        ));
    }
}

#[test]
fn close_indexes_queued_transactions_first() {
    let gate = Arc::new(Gate::default());
    let node = Arc::new(node_with(gate.clone()));
    let instant = node.submit_tx(&put(1)).unwrap();

    let closer = {
        let node = Arc::clone(&node);
        thread::spawn(move || node.close())
    };
    thread::sleep(Duration::from_millis(20));
    gate.release();
    closer.join().unwrap().unwrap();

    assert_eq!(node.await_tx(instant, Duration::ZERO).unwrap(), instant);
}

#[test]
fn submit_does_not_wait_for_slow_indexer() {
    let node = node_with(Arc::new(InMemoryIndex::with_delay(Duration::from_millis(300))));

    let started = Instant::now();
    for version in 0..4 {
        node.submit_tx(&put(version)).unwrap();
    }
    assert!(
        started.elapsed() < Duration::from_millis(200),
        "submits took {:?}",
        started.elapsed()
    );
    assert_eq!(node.sync(WAIT).unwrap().unwrap().tx_id, TransactionId::new(4));
}

#[test]
fn full_backlog_refuses_submission_without_blocking() {
    let gate = Arc::new(Gate::default());
    let node = Node::builder()
        .config(Config::default().max_index_backlog(2))
        .indexer(gate.clone())
        .open_in_memory()
        .unwrap();

    node.submit_tx(&put(1)).unwrap();
    let second = node.submit_tx(&put(2)).unwrap();

    let started = Instant::now();
    let err = node.submit_tx(&put(3)).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(err, CoreError::SubmissionFailed { ref reason } if reason.contains("backlog")));
    assert!(!err.is_retryable());
    assert_eq!(node.latest_submitted_tx(), Some(second));
    assert_eq!(node.document_count(), 2);

    gate.release();
    node.sync(WAIT).unwrap();
    let third = node.submit_tx(&put(3)).unwrap();
    assert_eq!(third.tx_id, TransactionId::new(3));
}
