//! Transaction log: id/time assignment and durable, ordered entries.
//!
//! Submitting a transaction takes three steps under one lock:
//!
//! 1. the [`Sequencer`] proposes the next instant
//! 2. the [`TxLog`] appends the entry as a single checksummed frame
//! 3. the sequencer commits the instant
//!
//! If step 2 fails the proposal is dropped, so ids stay gap-free.
//!
//! ## Invariants
//!
//! - ids are consecutive from 1; times never decrease
//! - an entry is recorded whole or not at all
//! - document bodies are written to the document store before the entry that
//!   references them
//! - a torn tail is discarded on open; any other damage refuses to open

mod entry;
mod sequencer;
mod writer;

pub use entry::{LogEntry, LoggedOperation, TxLogEntry};
pub use sequencer::Sequencer;
pub use writer::{Recovery, TxLog};
