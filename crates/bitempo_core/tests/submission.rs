//! End-to-end submission behaviour.

use bitempo_core::{
    Config, CoreError, DeleteOperation, Document, DocumentId, InMemoryIndex, ManualClock, Node,
    PutOperation, Timestamp, Transaction, TransactionId, TransactionInstant,
    TransactionOperation, Value,
};
use bitempo_storage::InMemoryBackend;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

fn my_doc() -> DocumentId {
    DocumentId::keyword("myDoc")
}

fn indexed_node() -> (Node, Arc<InMemoryIndex>) {
    let index = Arc::new(InMemoryIndex::new());
    let node = Node::builder()
        .config(Config::default().sync_on_submit(false))
        .indexer(index.clone())
        .open_in_memory()
        .unwrap();
    (node, index)
}

#[test]
fn two_versions_of_one_document() {
    let (node, index) = indexed_node();

    let v1 = Document::create(my_doc())
        .plus("version", 1)
        .unwrap()
        .plus("name", "first")
        .unwrap();
    let a = node
        .submit_tx(&Transaction::single(PutOperation::create(v1.clone())))
        .unwrap();

    let v2 = v1.plus("version", 2).unwrap();
    let b = node
        .submit_tx(&Transaction::single(PutOperation::create(v2.clone())))
        .unwrap();

    assert_eq!(a.tx_id, TransactionId::new(1));
    assert_eq!(b.tx_id, TransactionId::new(2));
    assert!(b.tx_time >= a.tx_time);

    assert_eq!(node.await_tx(b, WAIT).unwrap(), b);
    let synced = node.sync(WAIT).unwrap().unwrap();
    assert!(synced.tx_id >= TransactionId::new(2));
    assert!(node.current_watermark().unwrap() >= TransactionId::new(2));

    // v1 is untouched by plus
    assert_eq!(v1.get("version"), Some(&Value::Integer(1)));
    assert_eq!(index.document_at(&my_doc(), b.tx_time, None), Some(v2));
    if a.tx_time < b.tx_time {
        assert_eq!(
            index.document_at(&my_doc(), b.tx_time, Some(a.tx_time)),
            Some(v1)
        );
    }
}

#[test]
fn ids_increase_and_times_never_decrease() {
    let (node, _) = indexed_node();
    let mut previous: Option<TransactionInstant> = None;
    for version in 0..50 {
        let doc = Document::create(my_doc()).plus("version", version).unwrap();
        let instant = node
            .submit_tx(&Transaction::single(PutOperation::create(doc)))
            .unwrap();
        if let Some(prev) = previous {
            assert_eq!(instant.tx_id, prev.tx_id.next());
            assert!(instant.tx_time >= prev.tx_time);
        }
        previous = Some(instant);
    }
}

#[test]
fn inverted_range_rejected_before_submission() {
    let (node, _) = indexed_node();
    let t0 = Timestamp::from_millis(2_000);
    let t1 = Timestamp::from_millis(1_000);

    let err = DeleteOperation::with_valid_time_range(my_doc(), t0, t1).unwrap_err();
    assert!(matches!(err, CoreError::InvalidTimeRange { start, end } if start == t0 && end == t1));

    let doc = Document::create(my_doc());
    assert!(PutOperation::with_valid_time_range(doc, t0, t0).is_err());
    assert_eq!(node.latest_submitted_tx(), None);
}

#[test]
fn backwards_clock_is_clamped() {
    let clock = ManualClock::new(Timestamp::from_millis(10_000));
    let node = Node::builder().clock(clock.clone()).open_in_memory().unwrap();

    let a = node.submit_tx(&Transaction::default()).unwrap();
    clock.set(Timestamp::from_millis(9_000));
    let b = node.submit_tx(&Transaction::default()).unwrap();
    let c = node.submit_tx(&Transaction::default()).unwrap();

    assert_eq!(a.tx_time, Timestamp::from_millis(10_000));
    assert_eq!(b.tx_time, Timestamp::from_millis(10_001));
    assert_eq!(c.tx_time, Timestamp::from_millis(10_002));
}

#[test]
fn failed_log_write_consumes_no_id() {
    let log = InMemoryBackend::new();
    let log_handle = log.handle();
    let node = Node::open_with_backends(
        Config::default(),
        Box::new(log),
        Box::new(InMemoryBackend::new()),
        Arc::new(InMemoryIndex::new()),
    )
    .unwrap();

    let v1 = Document::create(my_doc()).plus("version", 1).unwrap();
    let first = node
        .submit_tx(&Transaction::single(PutOperation::create(v1.clone())))
        .unwrap();
    assert_eq!(node.document_count(), 1);

    log_handle.close();
    let v2 = v1.plus("version", 2).unwrap();
    let tx = Transaction::builder().put(v2.clone()).put(v1.clone()).build();
    let err = node.submit_tx(&tx).unwrap_err();
    assert!(matches!(err, CoreError::SubmissionFailed { .. }));
    assert_eq!(node.latest_submitted_tx(), Some(first));

    // the body of the failed put went with it; the earlier one stays
    assert_eq!(node.document_count(), 1);
    assert!(matches!(
        node.document(&v2.content_hash()),
        Err(CoreError::DocumentNotFound { .. })
    ));
    assert_eq!(node.document(&v1.content_hash()).unwrap(), v1);

    log_handle.reopen();
    let next = node.submit_tx(&Transaction::default()).unwrap();
    assert_eq!(next.tx_id, first.tx_id.next());
}

#[test]
fn failed_document_write_fails_submission() {
    let docs = InMemoryBackend::new();
    let docs_handle = docs.handle();
    let node = Node::open_with_backends(
        Config::default(),
        Box::new(InMemoryBackend::new()),
        Box::new(docs),
        Arc::new(InMemoryIndex::new()),
    )
    .unwrap();

    docs_handle.close();
    let tx = Transaction::single(PutOperation::create(Document::create(my_doc())));
    assert!(matches!(
        node.submit_tx(&tx),
        Err(CoreError::SubmissionFailed { .. })
    ));
    assert_eq!(node.latest_submitted_tx(), None);

    // deletes carry no body and still go through
    let delete = node
        .submit_tx(&Transaction::single(DeleteOperation::create(my_doc())))
        .unwrap();
    assert_eq!(delete.tx_id, TransactionId::new(1));
}

#[test]
fn oversized_entry_is_refused() {
    let node = Node::builder()
        .config(Config::default().max_entry_size(128))
        .open_in_memory()
        .unwrap();

    let tx: Transaction = (0..64_i64)
        .map(|i| TransactionOperation::from(DeleteOperation::create(DocumentId::from(i))))
        .chain(std::iter::once(TransactionOperation::from(PutOperation::create(
            Document::create(my_doc()),
        ))))
        .collect();
    assert!(matches!(
        node.submit_tx(&tx),
        Err(CoreError::SubmissionFailed { .. })
    ));
    assert_eq!(node.document_count(), 0);

    let small = node.submit_tx(&Transaction::default()).unwrap();
    assert_eq!(small.tx_id, TransactionId::new(1));
}

#[test]
fn repeated_map_key_is_refused_without_side_effects() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("node");
    let node = Node::open(&path).unwrap();

    let repeated = Value::Map(vec![
        (Value::keyword("k"), Value::Integer(1)),
        (Value::keyword("k"), Value::Integer(2)),
    ]);
    assert!(matches!(
        Document::create(my_doc()).plus("nested", repeated.clone()),
        Err(CoreError::InvalidOperation { .. })
    ));

    // an id cannot be checked up front, so it is caught when the body or the
    // entry is encoded
    let bad_id = DocumentId::new(repeated);
    for tx in [
        Transaction::single(PutOperation::create(Document::create(bad_id.clone()))),
        Transaction::single(DeleteOperation::create(bad_id)),
    ] {
        assert!(matches!(
            node.submit_tx(&tx),
            Err(CoreError::SubmissionFailed { .. })
        ));
    }
    assert_eq!(node.latest_submitted_tx(), None);
    assert_eq!(node.document_count(), 0);

    let good = node.submit_tx(&Transaction::default()).unwrap();
    assert_eq!(good.tx_id, TransactionId::new(1));
    assert_eq!(node.open_tx_log(None, true).unwrap().len(), 1);
    node.close().unwrap();

    let reopened = Node::open(&path).unwrap();
    assert_eq!(reopened.latest_submitted_tx(), Some(good));
    reopened.sync(WAIT).unwrap();
}

#[test]
fn identical_documents_are_stored_once() {
    let (node, _) = indexed_node();
    let doc = Document::create(my_doc()).plus("version", 1).unwrap();

    node.submit_tx(&Transaction::single(PutOperation::create(doc.clone())))
        .unwrap();
    node.submit_tx(&Transaction::single(PutOperation::with_valid_time(
        doc.clone(),
        Timestamp::from_millis(0),
    )))
    .unwrap();

    assert_eq!(node.document_count(), 1);
    assert_eq!(node.document(&doc.content_hash()).unwrap(), doc);
}

#[test]
fn end_without_start_is_valid_from_transaction_time() {
    let clock = ManualClock::new(Timestamp::from_millis(5_000));
    let index = Arc::new(InMemoryIndex::new());
    let node = Node::builder()
        .clock(clock)
        .indexer(index.clone())
        .open_in_memory()
        .unwrap();

    let doc = Document::create(my_doc());
    let live = node
        .submit_tx(&Transaction::single(PutOperation::with_valid_end(
            doc.clone(),
            Timestamp::from_millis(6_000),
        )))
        .unwrap();
    // ends before it would start: recorded in the log, skipped by the index
    let empty = node
        .submit_tx(&Transaction::single(DeleteOperation::with_valid_end(
            my_doc(),
            Timestamp::from_millis(4_000),
        )))
        .unwrap();
    node.await_tx(empty, WAIT).unwrap();

    assert_eq!(live.tx_time, Timestamp::from_millis(5_000));
    let history = index.history(&my_doc());
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].valid.start, Timestamp::from_millis(5_000));
    assert_eq!(
        index.document_at(&my_doc(), Timestamp::from_millis(5_500), None),
        Some(doc)
    );
    assert_eq!(
        index.document_at(&my_doc(), Timestamp::from_millis(6_000), None),
        None
    );
    assert_eq!(node.open_tx_log(None, false).unwrap().len(), 2);
}

#[test]
fn concurrent_submitters_get_gap_free_ids() {
    let (node, index) = indexed_node();
    let node = Arc::new(node);
    let threads: usize = 8;
    let per_thread: usize = 50;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let node = Arc::clone(&node);
            thread::spawn(move || {
                (0..per_thread)
                    .map(|i| {
                        let doc = Document::create(DocumentId::from(format!("doc-{t}")))
                            .plus("seq", i as i64)
                            .unwrap();
                        node.submit_tx(&Transaction::single(PutOperation::create(doc)))
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        let instants = handle.join().unwrap();
        // each submitter sees its own transactions in increasing order
        assert!(instants.windows(2).all(|w| w[0].tx_id < w[1].tx_id));
        ids.extend(instants.into_iter().map(|i| i.tx_id.as_u64()));
    }

    let total = (threads * per_thread) as u64;
    assert_eq!(ids, (1..=total).collect::<HashSet<_>>());

    let synced = node.sync(WAIT).unwrap().unwrap();
    assert_eq!(synced.tx_id, TransactionId::new(total));
    assert_eq!(index.indexed_through(), Some(TransactionId::new(total)));
    assert_eq!(index.document_count(), threads);
}

#[test]
fn transaction_can_be_submitted_twice() {
    let (node, index) = indexed_node();
    let tx = Transaction::builder()
        .put(Document::create(my_doc()).plus("version", 1).unwrap())
        .delete(DocumentId::keyword("other"))
        .build();

    let a = node.submit_tx(&tx).unwrap();
    let b = node.submit_tx(&tx).unwrap();
    node.await_tx(b, WAIT).unwrap();

    assert_ne!(a.tx_id, b.tx_id);
    assert_eq!(index.history(&my_doc()).len(), 2);
    assert_eq!(node.document_count(), 1);
}
