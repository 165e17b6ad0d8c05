//! Assignment of transaction ids and times.

use crate::clock::Clock;
use crate::types::{Timestamp, TransactionId, TransactionInstant};
use std::sync::Arc;
use tracing::warn;

/// Hands out transaction instants.
///
/// Ids increase by one per committed submission; times never go backwards.
/// The sequencer has a single owner, the submission path, which holds it
/// behind the same lock as the log so that assigning an instant and recording
/// it happen as one step.
///
/// Assignment is two-phase: [`Sequencer::propose`] computes the next instant
/// without consuming it and [`Sequencer::commit`] consumes it once the entry
/// is durable. A failed append therefore leaves no gap.
pub struct Sequencer {
    clock: Arc<dyn Clock>,
    next_id: TransactionId,
    last: Option<TransactionInstant>,
}

impl Sequencer {
    /// Creates a sequencer for an empty log.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            next_id: TransactionId::FIRST,
            last: None,
        }
    }

    /// Creates a sequencer continuing after `last`, as recovered from the log.
    pub fn resume(clock: Arc<dyn Clock>, last: Option<TransactionInstant>) -> Self {
        Self {
            clock,
            next_id: last.map_or(TransactionId::FIRST, |instant| instant.tx_id.next()),
            last,
        }
    }

    /// Computes the instant the next submission would get.
    ///
    /// If the clock reads earlier than the last assigned time, the time is
    /// clamped to one millisecond after it.
    pub fn propose(&self) -> TransactionInstant {
        let now = self.clock.now();
        let tx_time = match self.last {
            Some(last) if now < last.tx_time => {
                let clamped = last.tx_time.next_millisecond();
                warn!(
                    target: "bitempo::log",
                    clock = now.as_millis(),
                    last = last.tx_time.as_millis(),
                    "clock went backwards, clamping transaction time"
                );
                clamped
            }
            _ => now,
        };
        TransactionInstant::new(self.next_id, tx_time)
    }

    /// Consumes `instant`, which must be the one last proposed.
    pub fn commit(&mut self, instant: TransactionInstant) {
        debug_assert_eq!(instant.tx_id, self.next_id);
        self.next_id = instant.tx_id.next();
        self.last = Some(instant);
    }

    /// Returns the most recently committed instant.
    pub fn last(&self) -> Option<TransactionInstant> {
        self.last
    }

    /// Returns the id the next submission will get.
    pub fn next_id(&self) -> TransactionId {
        self.next_id
    }

    /// Returns the last assigned transaction time.
    pub fn last_time(&self) -> Option<Timestamp> {
        self.last.map(|instant| instant.tx_time)
    }
}
