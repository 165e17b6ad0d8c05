//! Property-based test generators using proptest.
//!
//! Strategies produce values that already satisfy the core's invariants:
//! field names never collide with the id field and bounded ranges are never
//! inverted.

use bitempo_core::{
    DeleteOperation, Document, DocumentId, PutOperation, Timestamp, Transaction,
    TransactionOperation, ValidTimeRange, Value, ID_FIELD,
};
use proptest::prelude::*;

/// Largest timestamp the time strategies produce, around the year 2100.
pub const MAX_TEST_MILLIS: i64 = 4_102_444_800_000;

/// Strategy for document ids: keywords, text, integers and UUIDs.
pub fn document_id_strategy() -> impl Strategy<Value = DocumentId> {
    prop_oneof![
        prop::string::string_regex("[a-z][a-zA-Z0-9_-]{0,15}")
            .expect("Invalid regex")
            .prop_map(DocumentId::keyword),
        prop::string::string_regex("[a-z0-9-]{1,16}")
            .expect("Invalid regex")
            .prop_map(DocumentId::from),
        any::<i64>().prop_map(DocumentId::from),
        prop::array::uniform16(any::<u8>()).prop_map(|bytes| DocumentId::new(Value::Uuid(bytes))),
    ]
}

/// Strategy for document field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}(/[a-z][a-z0-9_]{0,11})?")
        .expect("Invalid regex")
        .prop_filter("Field name must not be the id field", |name| name != ID_FIELD)
}

/// Strategy for field values, nesting arrays and maps up to three levels.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
        "[ -~]{0,24}".prop_map(Value::Text),
        "[a-z]{1,8}".prop_map(Value::Keyword),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            // distinct keys; the decoder rejects duplicates
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(|fields| {
                Value::map(
                    fields
                        .into_iter()
                        .map(|(name, value)| (Value::Keyword(name), value))
                        .collect(),
                )
            }),
        ]
    })
}

/// Strategy for documents with up to `max_fields` fields.
pub fn document_strategy(max_fields: usize) -> impl Strategy<Value = Document> {
    (
        document_id_strategy(),
        prop::collection::vec((field_name_strategy(), value_strategy()), 0..=max_fields),
    )
        .prop_map(|(id, fields)| {
            fields
                .into_iter()
                .fold(Document::create(id), |doc, (name, value)| {
                    doc.plus(name, value).expect("Generated field names are valid")
                })
        })
}

/// Strategy for timestamps between the epoch and [`MAX_TEST_MILLIS`].
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (0..MAX_TEST_MILLIS).prop_map(Timestamp::from_millis)
}

/// Strategy for valid-time ranges in every shape: open, start-only,
/// end-only and bounded.
pub fn valid_time_range_strategy() -> impl Strategy<Value = ValidTimeRange> {
    (
        prop::option::of(timestamp_strategy()),
        prop::option::of(timestamp_strategy()),
    )
        .prop_map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) if a == b => {
                ValidTimeRange::from_parts(Some(a), Some(a.next_millisecond()))
            }
            (Some(a), Some(b)) => ValidTimeRange::from_parts(Some(a.min(b)), Some(a.max(b))),
            (start, end) => ValidTimeRange::from_parts(start, end),
        })
        .prop_map(|range| range.expect("Generated ranges are ordered"))
}

/// Strategy for inverted or empty bounded ranges as `(start, end)` pairs.
///
/// Every pair should be rejected with `InvalidTimeRange`.
pub fn inverted_range_strategy() -> impl Strategy<Value = (Timestamp, Timestamp)> {
    (timestamp_strategy(), 0..1_000_000_i64).prop_map(|(end, gap)| {
        let start = Timestamp::from_millis(end.as_millis() + gap);
        (start, end)
    })
}

/// Strategy for a single put or delete.
pub fn operation_strategy() -> impl Strategy<Value = TransactionOperation> {
    prop_oneof![
        3 => (document_strategy(4), valid_time_range_strategy()).prop_map(|(doc, range)| {
            TransactionOperation::from(PutOperation {
                document: doc,
                valid_time: range,
            })
        }),
        1 => (document_id_strategy(), valid_time_range_strategy()).prop_map(|(id, range)| {
            TransactionOperation::from(DeleteOperation {
                id,
                valid_time: range,
            })
        }),
    ]
}

/// Strategy for transactions of up to `max_ops` operations.
pub fn transaction_strategy(max_ops: usize) -> impl Strategy<Value = Transaction> {
    prop::collection::vec(operation_strategy(), 0..=max_ops)
        .prop_map(|ops| ops.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitempo_core::CoreError;

    proptest! {
        #[test]
        fn generated_documents_hash_consistently(doc in document_strategy(6)) {
            let decoded = Document::from_value(&doc.to_value()).unwrap();
            prop_assert_eq!(decoded.content_hash(), doc.content_hash());
            prop_assert!(doc.get(ID_FIELD).is_none());
        }

        #[test]
        fn generated_ranges_are_ordered(range in valid_time_range_strategy()) {
            if let (Some(start), Some(end)) = (range.start(), range.end()) {
                prop_assert!(start < end);
            }
        }

        #[test]
        fn inverted_ranges_are_rejected((start, end) in inverted_range_strategy()) {
            let err = ValidTimeRange::between(start, end).unwrap_err();
            let is_range_error = matches!(err, CoreError::InvalidTimeRange { .. });
            prop_assert!(is_range_error);
        }

        #[test]
        fn generated_transactions_respect_size(tx in transaction_strategy(5)) {
            prop_assert!(tx.len() <= 5);
        }
    }
}
