//! Log entries and their encoded form.
//!
//! An entry is stored as the canonical CBOR map
//!
//! ```text
//! { :tx-id 2, :tx-time 1700000000000,
//!   :tx-ops [{ :op :put, :id :myDoc, :content-hash #bytes "..",
//!              :valid-time-start 1699999990000 }] }
//! ```
//!
//! Optional keys are left out rather than written as nil. Document bodies are
//! referenced by content hash and live in the document store.

use crate::document::{ContentHash, Document, DocumentId};
use crate::error::{CoreError, CoreResult};
use crate::tx::{DeleteOperation, PutOperation, TransactionOperation, ValidTimeRange};
use crate::types::{Timestamp, TransactionId, TransactionInstant};
use bitempo_codec::Value;

const TX_ID: &str = "tx-id";
const TX_TIME: &str = "tx-time";
const TX_OPS: &str = "tx-ops";
const OP: &str = "op";
const OP_PUT: &str = "put";
const OP_DELETE: &str = "delete";
const DOC_ID: &str = "id";
const CONTENT_HASH: &str = "content-hash";
const VALID_START: &str = "valid-time-start";
const VALID_END: &str = "valid-time-end";

/// An operation as recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggedOperation {
    /// A put, referencing the document body by hash.
    Put {
        /// Document id.
        id: DocumentId,
        /// Hash of the document body.
        content_hash: ContentHash,
        /// Valid-time range as submitted.
        valid_time: ValidTimeRange,
    },
    /// A delete.
    Delete {
        /// Document id.
        id: DocumentId,
        /// Valid-time range as submitted.
        valid_time: ValidTimeRange,
    },
}

impl LoggedOperation {
    /// Records `op`, replacing its document body with the body's hash.
    #[must_use]
    pub fn from_operation(op: &TransactionOperation) -> Self {
        match op {
            TransactionOperation::Put(put) => Self::Put {
                id: put.document.id().clone(),
                content_hash: put.document.content_hash(),
                valid_time: put.valid_time,
            },
            TransactionOperation::Delete(delete) => Self::Delete {
                id: delete.id.clone(),
                valid_time: delete.valid_time,
            },
        }
    }

    /// Rebuilds the full operation, looking up put bodies with `resolve`.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures.
    pub fn resolve<F>(&self, resolve: F) -> CoreResult<TransactionOperation>
    where
        F: FnOnce(&ContentHash) -> CoreResult<Document>,
    {
        Ok(match self {
            Self::Put {
                content_hash,
                valid_time,
                ..
            } => TransactionOperation::Put(PutOperation {
                document: resolve(content_hash)?,
                valid_time: *valid_time,
            }),
            Self::Delete { id, valid_time } => TransactionOperation::Delete(DeleteOperation {
                id: id.clone(),
                valid_time: *valid_time,
            }),
        })
    }

    /// Returns the document id.
    #[must_use]
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::Put { id, .. } | Self::Delete { id, .. } => id,
        }
    }

    fn to_value(&self) -> Value {
        let (kind, id, hash, valid_time) = match self {
            Self::Put {
                id,
                content_hash,
                valid_time,
            } => (OP_PUT, id, Some(content_hash), valid_time),
            Self::Delete { id, valid_time } => (OP_DELETE, id, None, valid_time),
        };

        let mut pairs = vec![
            (Value::keyword(OP), Value::keyword(kind)),
            (Value::keyword(DOC_ID), id.as_value().clone()),
        ];
        if let Some(hash) = hash {
            pairs.push((
                Value::keyword(CONTENT_HASH),
                Value::Bytes(hash.as_bytes().to_vec()),
            ));
        }
        if let Some(start) = valid_time.start() {
            pairs.push((Value::keyword(VALID_START), Value::Integer(start.as_millis())));
        }
        if let Some(end) = valid_time.end() {
            pairs.push((Value::keyword(VALID_END), Value::Integer(end.as_millis())));
        }
        Value::map(pairs)
    }

    fn from_value(value: &Value) -> CoreResult<Self> {
        let kind = match field(value, OP)? {
            Value::Keyword(kind) => kind.as_str(),
            other => return Err(malformed(format!("operation kind {other}"))),
        };
        let id = DocumentId::from(field(value, DOC_ID)?.clone());
        let valid_time = ValidTimeRange::from_parts(
            optional_time(value, VALID_START)?,
            optional_time(value, VALID_END)?,
        )?;

        match kind {
            OP_PUT => {
                let content_hash = field(value, CONTENT_HASH)?
                    .as_bytes()
                    .and_then(ContentHash::from_slice)
                    .ok_or_else(|| malformed("content hash"))?;
                Ok(Self::Put {
                    id,
                    content_hash,
                    valid_time,
                })
            }
            OP_DELETE => Ok(Self::Delete { id, valid_time }),
            other => Err(malformed(format!("unknown operation :{other}"))),
        }
    }
}

/// A transaction as recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Identity and time assigned at submission.
    pub instant: TransactionInstant,
    /// Operations in submission order.
    pub operations: Vec<LoggedOperation>,
}

impl LogEntry {
    /// Returns the encoded form.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction id does not fit a CBOR integer.
    pub fn to_value(&self) -> CoreResult<Value> {
        let tx_id = i64::try_from(self.instant.tx_id.as_u64())
            .map_err(|_| CoreError::invalid_operation("transaction id out of range"))?;

        Ok(Value::map(vec![
            (Value::keyword(TX_ID), Value::Integer(tx_id)),
            (
                Value::keyword(TX_TIME),
                Value::Integer(self.instant.tx_time.as_millis()),
            ),
            (
                Value::keyword(TX_OPS),
                Value::Array(self.operations.iter().map(LoggedOperation::to_value).collect()),
            ),
        ]))
    }

    /// Rebuilds an entry from its encoded form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LogCorruption`] if the value does not have the
    /// entry shape.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        let tx_id = field(value, TX_ID)?
            .as_integer()
            .and_then(|n| u64::try_from(n).ok())
            .filter(|&n| n > 0)
            .ok_or_else(|| malformed("transaction id"))?;
        let tx_time = field(value, TX_TIME)?
            .as_integer()
            .ok_or_else(|| malformed("transaction time"))?;
        let operations = field(value, TX_OPS)?
            .as_array()
            .ok_or_else(|| malformed("operation list"))?
            .iter()
            .map(LoggedOperation::from_value)
            .collect::<CoreResult<_>>()?;

        Ok(Self {
            instant: TransactionInstant::new(
                TransactionId::new(tx_id),
                Timestamp::from_millis(tx_time),
            ),
            operations,
        })
    }

    /// Encodes the entry to canonical CBOR.
    ///
    /// # Errors
    ///
    /// Returns an error if a document id nests too deeply to encode.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        Ok(bitempo_codec::to_canonical_cbor(&self.to_value()?)?)
    }

    /// Decodes an entry from canonical CBOR.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a well-formed entry.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let value = bitempo_codec::from_cbor(bytes)
            .map_err(|e| CoreError::log_corruption(format!("undecodable entry: {e}")))?;
        Self::from_value(&value)
    }
}

/// A transaction read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxLogEntry {
    /// Identity and time assigned at submission.
    pub instant: TransactionInstant,
    /// Operations with documents resolved, when requested.
    pub operations: Option<Vec<TransactionOperation>>,
}

fn field<'v>(value: &'v Value, name: &str) -> CoreResult<&'v Value> {
    value
        .as_map()
        .and_then(|pairs| {
            pairs
                .iter()
                .find(|(k, _)| matches!(k, Value::Keyword(k) if k == name))
        })
        .map(|(_, v)| v)
        .ok_or_else(|| malformed(format!("missing :{name}")))
}

fn optional_time(value: &Value, name: &str) -> CoreResult<Option<Timestamp>> {
    match field(value, name) {
        Ok(Value::Integer(millis)) => Ok(Some(Timestamp::from_millis(*millis))),
        Ok(other) => Err(malformed(format!(":{name} {other}"))),
        Err(_) => Ok(None),
    }
}

fn malformed(what: impl std::fmt::Display) -> CoreError {
    CoreError::log_corruption(format!("malformed log entry: {what}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitempo_codec::from_cbor;

    fn t(millis: i64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    fn sample() -> (LogEntry, Document) {
        let doc = Document::create(DocumentId::keyword("myDoc"))
            .plus("version", 1)
            .unwrap();
        let ops = [
            TransactionOperation::from(PutOperation::with_valid_time(doc.clone(), t(5))),
            TransactionOperation::from(
                DeleteOperation::with_valid_time_range(DocumentId::keyword("old"), t(1), t(2))
                    .unwrap(),
            ),
        ];
        let entry = LogEntry {
            instant: TransactionInstant::new(TransactionId::new(3), t(100)),
            operations: ops.iter().map(LoggedOperation::from_operation).collect(),
        };
        (entry, doc)
    }

    #[test]
    fn decode_inverts_encode() {
        let (entry, _) = sample();
        let bytes = entry.encode().unwrap();
        assert_eq!(LogEntry::decode(&bytes).unwrap(), entry);
    }

    #[test]
    fn encoded_shape_uses_keyword_keys() {
        let (entry, doc) = sample();
        let value = from_cbor(&entry.encode().unwrap()).unwrap();
        let pairs = value.as_map().unwrap();

        let keys: Vec<_> = pairs.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec![":tx-id", ":tx-ops", ":tx-time"]);

        let ops = field(&value, TX_OPS).unwrap().as_array().unwrap();
        let put = &ops[0];
        assert_eq!(field(put, OP).unwrap(), &Value::keyword("put"));
        assert_eq!(
            field(put, CONTENT_HASH).unwrap().as_bytes().unwrap(),
            doc.content_hash().as_bytes()
        );
        assert!(field(put, VALID_END).is_err());
        assert!(field(&ops[1], CONTENT_HASH).is_err());
    }

    #[test]
    fn resolve_restores_documents() {
        let (entry, doc) = sample();
        let expected = doc.clone();
        let op = entry.operations[0]
            .resolve(|hash| {
                assert_eq!(*hash, expected.content_hash());
                Ok(expected.clone())
            })
            .unwrap();
        assert_eq!(op.document(), Some(&doc));

        let delete = entry.operations[1]
            .resolve(|_| panic!("deletes carry no body"))
            .unwrap();
        assert_eq!(delete.document_id(), &DocumentId::keyword("old"));
    }

    #[test]
    fn reject_malformed_entries() {
        let no_ops = Value::map(vec![
            (Value::keyword(TX_ID), Value::Integer(1)),
            (Value::keyword(TX_TIME), Value::Integer(1)),
        ]);
        assert!(matches!(
            LogEntry::from_value(&no_ops),
            Err(CoreError::LogCorruption { .. })
        ));

        let zero_id = Value::map(vec![
            (Value::keyword(TX_ID), Value::Integer(0)),
            (Value::keyword(TX_TIME), Value::Integer(1)),
            (Value::keyword(TX_OPS), Value::Array(vec![])),
        ]);
        assert!(LogEntry::from_value(&zero_id).is_err());

        assert!(matches!(
            LogEntry::decode(&[0xff]),
            Err(CoreError::LogCorruption { .. })
        ));
    }

    #[test]
    fn empty_transaction_encodes() {
        let entry = LogEntry {
            instant: TransactionInstant::new(TransactionId::FIRST, t(0)),
            operations: Vec::new(),
        };
        assert_eq!(LogEntry::decode(&entry.encode().unwrap()).unwrap(), entry);
    }
}
