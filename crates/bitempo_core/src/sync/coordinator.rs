//! Waiting for the indexer to catch up with the log.

use crate::error::CoreResult;
use crate::sync::cancellation::WaitCancellation;
use crate::sync::watermark::Watermark;
use crate::types::{TransactionId, TransactionInstant};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Connects submitters with the indexing watermark.
///
/// The coordinator tracks two marks: the latest transaction accepted by the
/// log and the latest one the indexer has applied. Waits block on the second
/// until it reaches a requested transaction.
#[derive(Debug)]
pub struct SyncCoordinator {
    watermark: Arc<Watermark>,
    submitted: Mutex<Option<TransactionInstant>>,
}

impl SyncCoordinator {
    /// Creates a coordinator over `watermark`.
    pub fn new(watermark: Arc<Watermark>) -> Self {
        Self {
            watermark,
            submitted: Mutex::new(None),
        }
    }

    /// Returns the watermark this coordinator waits on.
    pub fn watermark(&self) -> &Arc<Watermark> {
        &self.watermark
    }

    /// Records that the log accepted `instant`.
    pub fn record_submitted(&self, instant: TransactionInstant) {
        let mut submitted = self.submitted.lock();
        if submitted.is_none_or(|last| last.tx_id < instant.tx_id) {
            *submitted = Some(instant);
        }
    }

    /// Returns the latest transaction the log accepted.
    pub fn latest_submitted(&self) -> Option<TransactionInstant> {
        *self.submitted.lock()
    }

    /// Returns the latest transaction the indexer applied.
    pub fn latest_completed(&self) -> Option<TransactionInstant> {
        self.watermark.latest()
    }

    /// Returns the id of the latest transaction the indexer applied.
    pub fn current_watermark(&self) -> Option<TransactionId> {
        self.watermark.current()
    }

    /// Blocks until `instant` is indexed, then returns it.
    ///
    /// # Errors
    ///
    /// [`SyncTimeout`](crate::CoreError::SyncTimeout) or
    /// [`EngineUnavailable`](crate::CoreError::EngineUnavailable).
    pub fn await_tx(
        &self,
        instant: TransactionInstant,
        timeout: Duration,
    ) -> CoreResult<TransactionInstant> {
        self.wait(instant.tx_id, timeout, None)?;
        Ok(instant)
    }

    /// Like [`SyncCoordinator::await_tx`], but `cancel` can abort the wait.
    ///
    /// # Errors
    ///
    /// Additionally [`WaitCancelled`](crate::CoreError::WaitCancelled).
    pub fn await_tx_cancellable(
        &self,
        instant: TransactionInstant,
        timeout: Duration,
        cancel: &WaitCancellation,
    ) -> CoreResult<TransactionInstant> {
        self.wait(instant.tx_id, timeout, Some(cancel))?;
        Ok(instant)
    }

    /// Blocks until `tx_id` is indexed and returns the watermark that
    /// satisfied the wait.
    ///
    /// # Errors
    ///
    /// As [`SyncCoordinator::await_tx`].
    pub fn await_tx_id(
        &self,
        tx_id: TransactionId,
        timeout: Duration,
    ) -> CoreResult<TransactionInstant> {
        self.wait(tx_id, timeout, None)
    }

    /// Blocks until everything submitted before this call is indexed.
    ///
    /// Returns the latest submitted transaction as of the call, or `None` if
    /// nothing was ever submitted.
    ///
    /// # Errors
    ///
    /// As [`SyncCoordinator::await_tx`].
    pub fn sync(&self, timeout: Duration) -> CoreResult<Option<TransactionInstant>> {
        let Some(target) = self.latest_submitted() else {
            return Ok(None);
        };
        self.wait(target.tx_id, timeout, None)?;
        Ok(Some(target))
    }

    fn wait(
        &self,
        tx_id: TransactionId,
        timeout: Duration,
        cancel: Option<&WaitCancellation>,
    ) -> CoreResult<TransactionInstant> {
        trace!(target: "bitempo::sync", tx_id = tx_id.as_u64(), ?timeout, "waiting for indexer");
        let Some(cancel) = cancel else {
            return self.watermark.wait_for(tx_id, timeout, None);
        };
        cancel.watch(&self.watermark);
        let outcome = self.watermark.wait_for(tx_id, timeout, Some(cancel));
        cancel.unwatch(&self.watermark);
        outcome
    }
}
