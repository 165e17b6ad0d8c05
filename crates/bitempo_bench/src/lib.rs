//! Benchmark utilities.

#![warn(missing_docs)]

use bitempo_core::{Document, DocumentId, PutOperation, Transaction, TransactionOperation, Value};
use rand::Rng;

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a document carrying roughly `payload_size` bytes across a few fields.
pub fn random_document(id: impl Into<DocumentId>, payload_size: usize) -> Document {
    let mut rng = rand::thread_rng();
    let doc = Document::create(id)
        .plus("seq", rng.gen::<i64>())
        .and_then(|d| d.plus("name", format!("name-{}", rng.gen::<u32>())))
        .and_then(|d| d.plus("payload", Value::Bytes(random_data(payload_size))));
    doc.expect("Benchmark documents use plain field names")
}

/// Generate `count` documents with distinct ids.
pub fn generate_documents(count: usize, payload_size: usize) -> Vec<Document> {
    (0..count)
        .map(|i| random_document(DocumentId::from(format!("doc-{i}")), payload_size))
        .collect()
}

/// A transaction putting every document from its transaction time.
pub fn put_all(documents: &[Document]) -> Transaction {
    documents
        .iter()
        .cloned()
        .map(|doc| TransactionOperation::from(PutOperation::create(doc)))
        .collect()
}
