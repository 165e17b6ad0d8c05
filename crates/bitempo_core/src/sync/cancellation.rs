//! Cancelling a blocked wait from another thread.

use crate::sync::watermark::Watermark;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    /// Watermarks with waits in progress, and how many.
    watching: Mutex<Vec<(Weak<Watermark>, usize)>>,
}

/// A token that aborts waits it was passed to.
///
/// Clones share state. Cancelling wakes every wait currently using the token;
/// those waits return [`CoreError::WaitCancelled`](crate::CoreError::WaitCancelled)
/// unless their transaction was already indexed. Waits that start after
/// cancellation fail immediately. Cancellation cannot be undone.
#[derive(Debug, Clone, Default)]
pub struct WaitCancellation {
    inner: Arc<Inner>,
}

impl WaitCancellation {
    /// Creates an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every wait using this token.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let watching = std::mem::take(&mut *self.inner.watching.lock());
        for watermark in watching.iter().filter_map(|(w, _)| w.upgrade()) {
            watermark.wake_all();
        }
    }

    /// Returns true once [`WaitCancellation::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Makes `cancel` wake waiters on `watermark`.
    ///
    /// Registrations are counted; each call must be paired with
    /// [`WaitCancellation::unwatch`] once the wait is over.
    pub(crate) fn watch(&self, watermark: &Arc<Watermark>) {
        let mut watching = self.inner.watching.lock();
        watching.retain(|(w, _)| w.strong_count() > 0);
        match watching
            .iter_mut()
            .find(|(w, _)| w.as_ptr() == Arc::as_ptr(watermark))
        {
            Some((_, waits)) => *waits += 1,
            None => watching.push((Arc::downgrade(watermark), 1)),
        }
    }

    /// Ends one registration made by [`WaitCancellation::watch`].
    pub(crate) fn unwatch(&self, watermark: &Arc<Watermark>) {
        let mut watching = self.inner.watching.lock();
        if let Some(pos) = watching
            .iter()
            .position(|(w, _)| w.as_ptr() == Arc::as_ptr(watermark))
        {
            watching[pos].1 -= 1;
            if watching[pos].1 == 0 {
                watching.swap_remove(pos);
            }
        }
        watching.retain(|(w, _)| w.strong_count() > 0);
    }

    #[cfg(test)]
    pub(crate) fn watched(&self) -> usize {
        self.inner.watching.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::types::TransactionId;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn cancel_wakes_blocked_wait() {
        let mark = Arc::new(Watermark::new());
        let token = WaitCancellation::new();
        token.watch(&mark);

        let waiter = {
            let mark = Arc::clone(&mark);
            let token = token.clone();
            thread::spawn(move || {
                mark.wait_for(TransactionId::new(1), Duration::from_secs(30), Some(&token))
            })
        };

        thread::sleep(Duration::from_millis(20));
        token.cancel();

        let err = waiter.join().unwrap().unwrap_err();
        assert!(matches!(err, CoreError::WaitCancelled { tx_id } if tx_id == TransactionId::new(1)));
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancelled_token_fails_new_waits() {
        let mark = Watermark::new();
        let token = WaitCancellation::new();
        token.cancel();
        let err = mark
            .wait_for(TransactionId::new(1), Duration::from_secs(30), Some(&token))
            .unwrap_err();
        assert!(matches!(err, CoreError::WaitCancelled { .. }));
    }

    #[test]
    fn watching_twice_registers_once() {
        let mark = Arc::new(Watermark::new());
        let token = WaitCancellation::new();
        token.watch(&mark);
        token.watch(&mark);
        assert_eq!(token.watched(), 1);

        // still watched until the second wait ends
        token.unwatch(&mark);
        assert_eq!(token.watched(), 1);
        token.unwatch(&mark);
        assert_eq!(token.watched(), 0);
    }

    #[test]
    fn long_lived_token_does_not_accumulate_registrations() {
        let token = WaitCancellation::new();
        let kept = Arc::new(Watermark::new());
        for _ in 0..100 {
            let mark = Arc::new(Watermark::new());
            token.watch(&mark);
            token.watch(&kept);
            token.unwatch(&kept);
            // dropped without unwatch; pruned on the next registration
        }
        assert_eq!(token.watched(), 1);

        let mark = Arc::new(Watermark::new());
        token.watch(&mark);
        token.unwatch(&mark);
        assert_eq!(token.watched(), 0);
    }
}
