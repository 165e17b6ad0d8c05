//! # Bitempo Storage
//!
//! Append-only byte stores underneath the bitempo transaction log and
//! document store.
//!
//! Backends are **opaque**: they know nothing about log frames, documents or
//! transactions. The core crate owns every byte format written through them.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral storage with a [`MemoryHandle`] for
//!   simulating outages, torn writes and restarts in tests
//! - [`FileBackend`] - persistent storage on a single OS file
//!
//! ## Example
//!
//! ```rust
//! use bitempo_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"entry").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"entry");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::{InMemoryBackend, MemoryHandle};
