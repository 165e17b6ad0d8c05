//! # Bitempo Core
//!
//! The transaction core of a bitemporal document store.
//!
//! This crate provides:
//! - Content-hashed [`Document`]s and their ids
//! - Put and delete operations over valid-time ranges, and a
//!   [`TransactionBuilder`]
//! - A durable transaction log that assigns gap-free ids and monotonic
//!   transaction times
//! - A content-addressed document store
//! - Hand-off of every accepted transaction to an [`Indexer`] on a background
//!   thread
//! - Read-your-writes waits on the indexing watermark
//!
//! Each fact is recorded on two time axes. *Valid time* is when the fact
//! holds in the modelled world and is chosen by the caller. *Transaction
//! time* is when the node recorded it and is assigned by the log.
//!
//! ## Example
//!
//! ```rust
//! use bitempo_core::{Document, DocumentId, Node, PutOperation, Transaction};
//! use std::time::Duration;
//!
//! let node = Node::open_in_memory()?;
//!
//! let v1 = Document::create(DocumentId::keyword("myDoc")).plus("version", 1)?;
//! let a = node.submit_tx(&Transaction::single(PutOperation::create(v1.clone())))?;
//!
//! let v2 = v1.plus("version", 2)?;
//! let b = node.submit_tx(&Transaction::single(PutOperation::create(v2)))?;
//! assert!(b.tx_id > a.tx_id);
//!
//! node.await_tx(b, Duration::from_secs(5))?;
//! # Ok::<(), bitempo_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
#[cfg(feature = "std")]
mod dir;
mod docstore;
mod document;
mod error;
pub mod frame;
mod index;
pub mod log;
mod node;
mod sync;
mod tx;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
#[cfg(feature = "std")]
pub use dir::NodeDir;
pub use docstore::{DocumentStore, StoreMark};
pub use document::{ContentHash, Document, DocumentId, ID_FIELD};
pub use error::{CoreError, CoreResult};
pub use index::{DocumentVersion, IndexedTx, Indexer, InMemoryIndex, VersionContent};
pub use log::TxLogEntry;
pub use node::{Node, NodeBuilder};
pub use sync::{SyncCoordinator, WaitCancellation, Watermark};
pub use tx::{
    DeleteOperation, PutOperation, ResolvedRange, Transaction, TransactionBuilder,
    TransactionOperation, ValidTimeRange,
};
pub use types::{Timestamp, TransactionId, TransactionInstant};

// Re-exported so callers can build field values without a direct dependency.
pub use bitempo_codec::Value;
