//! Document identifier.

use bitempo_codec::Value;
use std::fmt;
use uuid::Uuid;

/// Identifier of a document.
///
/// Any codec value can serve as an id; keywords and UUIDs are the usual
/// choices. Equality, ordering and hashing follow the canonical encoding of
/// the wrapped value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(Value);

impl DocumentId {
    /// Wraps a value as a document id.
    #[must_use]
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    /// Creates a keyword id such as `:person/ivan`.
    #[must_use]
    pub fn keyword(name: impl Into<String>) -> Self {
        Self(Value::keyword(name))
    }

    /// Creates a new random UUID id.
    #[must_use]
    pub fn random() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Creates an id from a UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(Value::Uuid(uuid.into_bytes()))
    }

    /// Returns the UUID if this id is one.
    #[must_use]
    pub fn to_uuid(&self) -> Option<Uuid> {
        match &self.0 {
            Value::Uuid(bytes) => Some(Uuid::from_bytes(*bytes)),
            _ => None,
        }
    }

    /// Returns the wrapped value.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Unwraps the value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Value> for DocumentId {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

impl From<Uuid> for DocumentId {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl From<&str> for DocumentId {
    fn from(text: &str) -> Self {
        Self(Value::from(text))
    }
}

impl From<String> for DocumentId {
    fn from(text: String) -> Self {
        Self(Value::Text(text))
    }
}

impl From<i64> for DocumentId {
    fn from(n: i64) -> Self {
        Self(Value::Integer(n))
    }
}
