//! The indexed-through watermark and its wait/notify signal.

use crate::error::{CoreError, CoreResult};
use crate::sync::cancellation::WaitCancellation;
use crate::types::{TransactionId, TransactionInstant};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct WatermarkState {
    latest: Option<TransactionInstant>,
    failure: Option<String>,
}

/// Highest transaction the indexer has fully applied.
///
/// The indexing worker is the only writer. It calls [`Watermark::advance`]
/// after the indexer has applied an entry, under the watermark mutex, so a
/// waiter that sees the watermark at `X` also sees every entry up to `X`
/// applied. Every advance wakes all waiters.
///
/// Once the engine fails or the node closes the watermark is poisoned:
/// current and future waits that have not already been satisfied fail with
/// [`CoreError::EngineUnavailable`].
#[derive(Debug, Default)]
pub struct Watermark {
    state: Mutex<WatermarkState>,
    advanced: Condvar,
}

impl Watermark {
    /// Creates a watermark with nothing indexed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the highest indexed transaction id.
    pub fn current(&self) -> Option<TransactionId> {
        self.state.lock().latest.map(|instant| instant.tx_id)
    }

    /// Returns the highest indexed transaction.
    pub fn latest(&self) -> Option<TransactionInstant> {
        self.state.lock().latest
    }

    /// Returns why the engine stopped, if it has.
    pub fn failure(&self) -> Option<String> {
        self.state.lock().failure.clone()
    }

    /// Records that `instant` and everything before it are indexed.
    ///
    /// Advancing backwards is ignored.
    pub fn advance(&self, instant: TransactionInstant) {
        let mut state = self.state.lock();
        if state.latest.is_some_and(|latest| latest.tx_id >= instant.tx_id) {
            return;
        }
        state.latest = Some(instant);
        drop(state);
        self.advanced.notify_all();
    }

    /// Poisons the watermark and wakes every waiter.
    ///
    /// The first reason wins.
    pub fn fail(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        if state.failure.is_none() {
            state.failure = Some(reason.into());
        }
        drop(state);
        self.advanced.notify_all();
    }

    /// Wakes every waiter so it re-checks its cancellation token.
    pub(crate) fn wake_all(&self) {
        // taking the lock orders this wake-up after any waiter's last check
        let _state = self.state.lock();
        self.advanced.notify_all();
    }

    /// Blocks until `tx_id` is indexed, the timeout passes, the engine fails
    /// or `cancel` fires.
    ///
    /// Returns the watermark instant that satisfied the wait.
    ///
    /// # Errors
    ///
    /// - [`CoreError::SyncTimeout`] when `timeout` elapses first
    /// - [`CoreError::EngineUnavailable`] when the engine stopped
    /// - [`CoreError::WaitCancelled`] when `cancel` fired
    pub fn wait_for(
        &self,
        tx_id: TransactionId,
        timeout: Duration,
        cancel: Option<&WaitCancellation>,
    ) -> CoreResult<TransactionInstant> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.state.lock();

        loop {
            if let Some(latest) = state.latest.filter(|latest| latest.tx_id >= tx_id) {
                return Ok(latest);
            }
            if let Some(reason) = &state.failure {
                return Err(CoreError::engine_unavailable(reason.clone()));
            }
            if cancel.is_some_and(WaitCancellation::is_cancelled) {
                return Err(CoreError::WaitCancelled { tx_id });
            }

            let timed_out = match deadline {
                Some(deadline) => self.advanced.wait_until(&mut state, deadline).timed_out(),
                // a timeout too large to represent is a wait without one
                None => {
                    self.advanced.wait(&mut state);
                    false
                }
            };

            if timed_out {
                if let Some(latest) = state.latest.filter(|latest| latest.tx_id >= tx_id) {
                    return Ok(latest);
                }
                return Err(CoreError::SyncTimeout {
                    tx_id,
                    watermark: state.latest.map(|latest| latest.tx_id),
                    timeout,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;
    use std::sync::Arc;
    use std::thread;

    fn instant(id: u64) -> TransactionInstant {
        TransactionInstant::new(TransactionId::new(id), Timestamp::from_millis(id as i64))
    }

    #[test]
    fn advance_is_monotonic() {
        let mark = Watermark::new();
        assert_eq!(mark.current(), None);

        mark.advance(instant(2));
        mark.advance(instant(1));
        assert_eq!(mark.current(), Some(TransactionId::new(2)));
        assert_eq!(mark.latest(), Some(instant(2)));
    }

    #[test]
    fn satisfied_wait_returns_immediately() {
        let mark = Watermark::new();
        mark.advance(instant(3));
        let got = mark
            .wait_for(TransactionId::new(2), Duration::ZERO, None)
            .unwrap();
        assert_eq!(got, instant(3));
    }

    #[test]
    fn wait_times_out() {
        let mark = Watermark::new();
        mark.advance(instant(1));

        let err = mark
            .wait_for(TransactionId::new(2), Duration::from_millis(20), None)
            .unwrap_err();
        match err {
            CoreError::SyncTimeout {
                tx_id, watermark, ..
            } => {
                assert_eq!(tx_id, TransactionId::new(2));
                assert_eq!(watermark, Some(TransactionId::new(1)));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn advance_wakes_waiter() {
        let mark = Arc::new(Watermark::new());
        let waiter = {
            let mark = Arc::clone(&mark);
            thread::spawn(move || mark.wait_for(TransactionId::new(5), Duration::from_secs(10), None))
        };

        thread::sleep(Duration::from_millis(20));
        for id in 1..=5 {
            mark.advance(instant(id));
        }
        assert_eq!(waiter.join().unwrap().unwrap(), instant(5));
    }

    #[test]
    fn failure_reaches_all_waiters() {
        let mark = Arc::new(Watermark::new());
        let waiters: Vec<_> = (1..=3)
            .map(|id| {
                let mark = Arc::clone(&mark);
                thread::spawn(move || {
                    mark.wait_for(TransactionId::new(id), Duration::from_secs(10), None)
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        mark.fail("indexer crashed");
        mark.fail("second reason ignored");

        for waiter in waiters {
            let err = waiter.join().unwrap().unwrap_err();
            assert!(matches!(err, CoreError::EngineUnavailable { ref reason } if reason == "indexer crashed"));
        }
    }

    #[test]
    fn satisfied_wait_wins_over_failure() {
        let mark = Watermark::new();
        mark.advance(instant(1));
        mark.fail("closed");
        assert!(mark
            .wait_for(TransactionId::new(1), Duration::ZERO, None)
            .is_ok());
        assert!(mark
            .wait_for(TransactionId::new(2), Duration::ZERO, None)
            .is_err());
    }

    #[test]
    fn huge_timeout_still_wakes() {
        let mark = Arc::new(Watermark::new());
        let waiter = {
            let mark = Arc::clone(&mark);
            thread::spawn(move || mark.wait_for(TransactionId::new(1), Duration::MAX, None))
        };
        thread::sleep(Duration::from_millis(10));
        mark.advance(instant(1));
        assert!(waiter.join().unwrap().is_ok());
    }
}
