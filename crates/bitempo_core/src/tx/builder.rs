//! Transactions and their builder.

use crate::document::{Document, DocumentId};
use crate::tx::operation::{DeleteOperation, PutOperation, TransactionOperation};

/// An ordered, atomic batch of operations.
///
/// Built once with [`TransactionBuilder`] and immutable afterwards; safe to
/// share between threads and submit more than once.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    operations: Vec<TransactionOperation>,
}

impl Transaction {
    /// Starts building a transaction.
    #[must_use]
    pub fn builder() -> TransactionBuilder {
        TransactionBuilder::default()
    }

    /// A transaction holding one operation.
    #[must_use]
    pub fn single(op: impl Into<TransactionOperation>) -> Self {
        Self {
            operations: vec![op.into()],
        }
    }

    /// Returns the operations in order.
    #[must_use]
    pub fn operations(&self) -> &[TransactionOperation] {
        &self.operations
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true for a transaction with no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Iterates the documents written by put operations.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.operations.iter().filter_map(TransactionOperation::document)
    }
}

impl FromIterator<TransactionOperation> for Transaction {
    fn from_iter<I: IntoIterator<Item = TransactionOperation>>(iter: I) -> Self {
        Self {
            operations: iter.into_iter().collect(),
        }
    }
}

/// Accumulates operations for a [`Transaction`].
///
/// Single owner while building; [`TransactionBuilder::build`] consumes it.
///
/// # Example
///
/// ```rust
/// use bitempo_core::{DeleteOperation, Document, DocumentId, PutOperation, Transaction};
///
/// let doc = Document::create(DocumentId::keyword("myDoc")).plus("version", 1).unwrap();
/// let tx = Transaction::builder()
///     .add(PutOperation::create(doc))
///     .add(DeleteOperation::create(DocumentId::keyword("oldDoc")))
///     .build();
/// assert_eq!(tx.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct TransactionBuilder {
    operations: Vec<TransactionOperation>,
}

impl TransactionBuilder {
    /// Appends an operation.
    #[must_use]
    pub fn add(mut self, op: impl Into<TransactionOperation>) -> Self {
        self.operations.push(op.into());
        self
    }

    /// Appends a put valid from the transaction time onward.
    #[must_use]
    pub fn put(self, document: Document) -> Self {
        self.add(PutOperation::create(document))
    }

    /// Appends a delete effective from the transaction time onward.
    #[must_use]
    pub fn delete(self, id: impl Into<DocumentId>) -> Self {
        self.add(DeleteOperation::create(id))
    }

    /// Returns the number of operations added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if nothing has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Finishes the transaction.
    #[must_use]
    pub fn build(self) -> Transaction {
        Transaction {
            operations: self.operations,
        }
    }
}
