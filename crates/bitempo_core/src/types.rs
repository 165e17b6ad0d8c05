//! Core type definitions.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Unique identifier for a submitted transaction.
///
/// Transaction IDs start at 1, are assigned by the log, increase strictly and
/// never skip a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// The first id a fresh log hands out.
    pub const FIRST: Self = Self(1);

    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next transaction ID.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx:{}", self.0)
    }
}

/// A point in time, in milliseconds since the Unix epoch.
///
/// Used for both time axes. Negative values are legal valid times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Self = Self(0);

    /// Creates a timestamp from milliseconds since the epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns milliseconds since the epoch.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Reads the system wall clock.
    ///
    /// A clock set before the epoch reads as the epoch.
    #[must_use]
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    /// Returns the timestamp one millisecond later.
    #[must_use]
    pub const fn next_millisecond(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns this timestamp shifted forward by `duration`.
    #[must_use]
    pub fn plus(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Returns this timestamp shifted back by `duration`.
    #[must_use]
    pub fn minus(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(millis))
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        let millis = time
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self(millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity and time the log assigned to a submitted transaction.
///
/// Equality is by the pair. Across a log, ids increase strictly and times
/// never decrease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionInstant {
    /// Assigned transaction id.
    pub tx_id: TransactionId,
    /// Assigned transaction time.
    pub tx_time: Timestamp,
}

impl TransactionInstant {
    /// Creates a transaction instant.
    #[must_use]
    pub const fn new(tx_id: TransactionId, tx_time: Timestamp) -> Self {
        Self { tx_id, tx_time }
    }
}

impl fmt::Display for TransactionInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.tx_id, self.tx_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_ordering() {
        let t1 = TransactionId::new(1);
        let t2 = t1.next();
        assert!(t1 < t2);
        assert_eq!(t2.as_u64(), 2);
        assert_eq!(TransactionId::FIRST, t1);
    }

    #[test]
    fn timestamp_arithmetic_saturates() {
        let t = Timestamp::from_millis(i64::MAX - 1);
        assert_eq!(t.next_millisecond().as_millis(), i64::MAX);
        assert_eq!(t.next_millisecond().next_millisecond().as_millis(), i64::MAX);
        assert_eq!(
            Timestamp::EPOCH.plus(Duration::from_secs(2)).as_millis(),
            2000
        );
        assert_eq!(
            Timestamp::EPOCH.minus(Duration::from_millis(5)).as_millis(),
            -5
        );
    }

    #[test]
    fn timestamp_before_epoch_reads_as_epoch() {
        let before = UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(Timestamp::from(before), Timestamp::EPOCH);
    }

    #[test]
    fn instant_display() {
        let instant = TransactionInstant::new(TransactionId::new(2), Timestamp::from_millis(99));
        assert_eq!(instant.to_string(), "tx:2@99");
    }
}
