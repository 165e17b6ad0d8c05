//! Put and delete operations with their valid-time ranges.

use crate::document::{Document, DocumentId};
use crate::error::{CoreError, CoreResult};
use crate::types::Timestamp;

/// The valid-time interval an operation applies to, half-open `[start, end)`.
///
/// A missing start means "from the transaction time"; a missing end means
/// "forever". Both are filled in by [`ValidTimeRange::resolve`] once the log
/// has assigned a transaction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ValidTimeRange {
    start: Option<Timestamp>,
    end: Option<Timestamp>,
}

/// A valid-time range with its start filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedRange {
    /// Inclusive start.
    pub start: Timestamp,
    /// Exclusive end, `None` for open-ended.
    pub end: Option<Timestamp>,
}

impl ResolvedRange {
    /// Returns true if `time` falls inside the range.
    #[must_use]
    pub fn contains(&self, time: Timestamp) -> bool {
        self.start <= time && self.end.is_none_or(|end| time < end)
    }
}

impl ValidTimeRange {
    /// From the transaction time, open-ended.
    #[must_use]
    pub const fn open() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// From `start`, open-ended.
    #[must_use]
    pub const fn starting_at(start: Timestamp) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// From `start` until `end`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTimeRange`] unless `start < end`.
    pub fn between(start: Timestamp, end: Timestamp) -> CoreResult<Self> {
        Self::from_parts(Some(start), Some(end))
    }

    /// From the transaction time until `end`.
    ///
    /// The range is only known to be non-empty once the transaction time is;
    /// see [`ValidTimeRange::resolve`].
    #[must_use]
    pub const fn until(end: Timestamp) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    /// Builds a range from optional bounds.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTimeRange`] if both bounds are given and
    /// `end <= start`.
    pub fn from_parts(start: Option<Timestamp>, end: Option<Timestamp>) -> CoreResult<Self> {
        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                return Err(CoreError::InvalidTimeRange { start, end });
            }
        }
        Ok(Self { start, end })
    }

    /// Returns the explicit start, if any.
    #[must_use]
    pub const fn start(&self) -> Option<Timestamp> {
        self.start
    }

    /// Returns the explicit end, if any.
    #[must_use]
    pub const fn end(&self) -> Option<Timestamp> {
        self.end
    }

    /// Fills in a missing start with `tx_time`.
    ///
    /// Returns `None` when the result is empty, which can only happen for a
    /// range built with [`ValidTimeRange::until`] whose end is not after the
    /// transaction time.
    #[must_use]
    pub fn resolve(&self, tx_time: Timestamp) -> Option<ResolvedRange> {
        let start = self.start.unwrap_or(tx_time);
        match self.end {
            Some(end) if end <= start => None,
            end => Some(ResolvedRange { start, end }),
        }
    }
}

/// Asserts a document over a valid-time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOperation {
    /// The document to assert.
    pub document: Document,
    /// When the document is valid.
    pub valid_time: ValidTimeRange,
}

impl PutOperation {
    /// Valid from the transaction time onward.
    #[must_use]
    pub fn create(document: Document) -> Self {
        Self {
            document,
            valid_time: ValidTimeRange::open(),
        }
    }

    /// Valid from `start` onward.
    #[must_use]
    pub fn with_valid_time(document: Document, start: Timestamp) -> Self {
        Self {
            document,
            valid_time: ValidTimeRange::starting_at(start),
        }
    }

    /// Valid from `start` until `end`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTimeRange`] unless `start < end`.
    pub fn with_valid_time_range(
        document: Document,
        start: Timestamp,
        end: Timestamp,
    ) -> CoreResult<Self> {
        Ok(Self {
            document,
            valid_time: ValidTimeRange::between(start, end)?,
        })
    }

    /// Valid from the transaction time until `end`.
    #[must_use]
    pub fn with_valid_end(document: Document, end: Timestamp) -> Self {
        Self {
            document,
            valid_time: ValidTimeRange::until(end),
        }
    }
}

/// Marks a document absent over a valid-time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOperation {
    /// The document to delete.
    pub id: DocumentId,
    /// When the document is absent.
    pub valid_time: ValidTimeRange,
}

impl DeleteOperation {
    /// Absent from the transaction time onward.
    #[must_use]
    pub fn create(id: impl Into<DocumentId>) -> Self {
        Self {
            id: id.into(),
            valid_time: ValidTimeRange::open(),
        }
    }

    /// Absent from `start` onward.
    #[must_use]
    pub fn with_valid_time(id: impl Into<DocumentId>, start: Timestamp) -> Self {
        Self {
            id: id.into(),
            valid_time: ValidTimeRange::starting_at(start),
        }
    }

    /// Absent from `start` until `end`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTimeRange`] unless `start < end`.
    pub fn with_valid_time_range(
        id: impl Into<DocumentId>,
        start: Timestamp,
        end: Timestamp,
    ) -> CoreResult<Self> {
        Ok(Self {
            id: id.into(),
            valid_time: ValidTimeRange::between(start, end)?,
        })
    }

    /// Absent from the transaction time until `end`.
    #[must_use]
    pub fn with_valid_end(id: impl Into<DocumentId>, end: Timestamp) -> Self {
        Self {
            id: id.into(),
            valid_time: ValidTimeRange::until(end),
        }
    }
}

/// One step of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOperation {
    /// Assert a document.
    Put(PutOperation),
    /// Retract a document.
    Delete(DeleteOperation),
}

impl TransactionOperation {
    /// Returns the id of the affected document.
    #[must_use]
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::Put(put) => put.document.id(),
            Self::Delete(delete) => &delete.id,
        }
    }

    /// Returns the valid-time range.
    #[must_use]
    pub fn valid_time(&self) -> ValidTimeRange {
        match self {
            Self::Put(put) => put.valid_time,
            Self::Delete(delete) => delete.valid_time,
        }
    }

    /// Returns the document body for a put.
    #[must_use]
    pub fn document(&self) -> Option<&Document> {
        match self {
            Self::Put(put) => Some(&put.document),
            Self::Delete(_) => None,
        }
    }
}

impl From<PutOperation> for TransactionOperation {
    fn from(op: PutOperation) -> Self {
        Self::Put(op)
    }
}

impl From<DeleteOperation> for TransactionOperation {
    fn from(op: DeleteOperation) -> Self {
        Self::Delete(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(millis: i64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    #[test]
    fn end_before_start_rejected() {
        let err = DeleteOperation::with_valid_time_range("myDoc", t(10), t(5)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTimeRange { start, end } if start == t(10) && end == t(5)
        ));
    }

    #[test]
    fn empty_range_rejected() {
        let doc = Document::create("myDoc");
        assert!(matches!(
            PutOperation::with_valid_time_range(doc, t(7), t(7)),
            Err(CoreError::InvalidTimeRange { .. })
        ));
    }

    #[test]
    fn resolve_defaults_start_to_tx_time() {
        let range = ValidTimeRange::open().resolve(t(100)).unwrap();
        assert_eq!(range.start, t(100));
        assert_eq!(range.end, None);

        let range = ValidTimeRange::starting_at(t(5)).resolve(t(100)).unwrap();
        assert_eq!(range.start, t(5));
    }

    #[test]
    fn end_only_resolves_against_tx_time() {
        let range = ValidTimeRange::until(t(200));
        assert_eq!(
            range.resolve(t(100)),
            Some(ResolvedRange {
                start: t(100),
                end: Some(t(200))
            })
        );
        // end already passed by the time the transaction is recorded
        assert_eq!(range.resolve(t(200)), None);
        assert_eq!(range.resolve(t(300)), None);
    }

    #[test]
    fn resolved_range_is_half_open() {
        let range = ValidTimeRange::between(t(1), t(3)).unwrap().resolve(t(0)).unwrap();
        assert!(!range.contains(t(0)));
        assert!(range.contains(t(1)));
        assert!(range.contains(t(2)));
        assert!(!range.contains(t(3)));

        let open = ValidTimeRange::open().resolve(t(1)).unwrap();
        assert!(open.contains(t(i64::MAX)));
    }

    #[test]
    fn operation_accessors() {
        let doc = Document::create(DocumentId::keyword("a"));
        let put: TransactionOperation = PutOperation::with_valid_time(doc.clone(), t(4)).into();
        assert_eq!(put.document_id(), doc.id());
        assert_eq!(put.document(), Some(&doc));
        assert_eq!(put.valid_time().start(), Some(t(4)));

        let delete: TransactionOperation =
            DeleteOperation::with_valid_end(DocumentId::keyword("a"), t(9)).into();
        assert!(delete.document().is_none());
        assert_eq!(delete.valid_time().start(), None);
        assert_eq!(delete.valid_time().end(), Some(t(9)));
    }
}
