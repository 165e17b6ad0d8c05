//! Transaction construction: operations and the builder.

mod builder;
mod operation;

pub use builder::{Transaction, TransactionBuilder};
pub use operation::{
    DeleteOperation, PutOperation, ResolvedRange, TransactionOperation, ValidTimeRange,
};
