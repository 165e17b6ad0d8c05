//! Read-your-writes coordination between submitters and the indexer.
//!
//! The indexer publishes a [`Watermark`]: the highest transaction id it has
//! fully applied. Waiters block on it with a deadline and, optionally, a
//! [`WaitCancellation`] token. A failed or closed engine poisons the
//! watermark and releases every waiter with an error.

mod cancellation;
mod coordinator;
mod watermark;

pub use cancellation::WaitCancellation;
pub use coordinator::SyncCoordinator;
pub use watermark::Watermark;
