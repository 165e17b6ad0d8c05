//! # Bitempo Testkit
//!
//! Test utilities for bitempo.
//!
//! This crate provides:
//! - Node fixtures that clean up after themselves
//! - Property-based generators for documents, ranges and transactions
//! - Golden file helpers and content-hash vectors
//! - A concurrent submit/await stress driver
//!
//! ## Usage
//!
//! ```rust
//! use bitempo_testkit::prelude::*;
//! use bitempo_core::{Document, DocumentId, PutOperation, Transaction};
//! use std::time::Duration;
//!
//! with_temp_node(|node| {
//!     let doc = Document::create(DocumentId::keyword("myDoc"));
//!     let instant = node.submit_tx(&Transaction::single(PutOperation::create(doc))).unwrap();
//!     node.await_tx(instant, Duration::from_secs(5)).unwrap();
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod golden;
pub mod stress;
pub mod vectors;

use std::sync::Once;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::vectors::*;
    pub use crate::init_test_logging;
}

pub use fixtures::*;
pub use generators::*;
pub use golden::*;
pub use stress::*;
pub use vectors::*;

static LOGGING: Once = Once::new();

/// Routes `tracing` output to the test writer.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Safe to call from
/// every test; only the first call installs the subscriber.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        // another harness may already own the global subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
