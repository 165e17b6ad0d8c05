//! Documents: an id plus a mapping of fields to values.
//!
//! A [`Document`] is immutable. [`Document::plus`] and [`Document::minus`]
//! return modified copies. Its [`ContentHash`] is the SHA-256 of the
//! canonical CBOR map
//!
//! ```text
//! { :bitempo.db/id <id>, :<field> <value>, ... }
//! ```
//!
//! Canonical CBOR sorts map keys, so the hash does not depend on the order
//! fields were added in. Changing this layout changes every stored hash.

mod hash;
mod id;

pub use hash::ContentHash;
pub use id::DocumentId;

use crate::error::{CoreError, CoreResult};
use bitempo_codec::Value;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Field name reserved for the document id in the encoded form.
pub const ID_FIELD: &str = "bitempo.db/id";

/// A document: an id and its fields, in insertion order.
#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    fields: Vec<(String, Value)>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn create(id: impl Into<DocumentId>) -> Self {
        Self {
            id: id.into(),
            fields: Vec::new(),
        }
    }

    /// Returns a copy with `key` set to `value`.
    ///
    /// An existing field keeps its position; a new one goes last.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if `key` is the reserved
    /// [`ID_FIELD`], or if `value` could never be stored: a map inside it
    /// repeats a key, or it nests too deeply.
    pub fn plus(&self, key: impl Into<String>, value: impl Into<Value>) -> CoreResult<Self> {
        let key = key.into();
        if key == ID_FIELD {
            return Err(CoreError::invalid_operation(format!(
                "field {ID_FIELD} is reserved for the document id"
            )));
        }

        let value = value.into();
        if let Err(e) = value.validate() {
            return Err(CoreError::invalid_operation(format!("field {key}: {e}")));
        }
        let mut fields = self.fields.clone();
        match fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => fields.push((key, value)),
        }

        Ok(Self {
            id: self.id.clone(),
            fields,
        })
    }

    /// Returns a copy without `key`. Removing an absent field is a no-op.
    #[must_use]
    pub fn minus(&self, key: &str) -> Self {
        Self {
            id: self.id.clone(),
            fields: self
                .fields
                .iter()
                .filter(|(k, _)| k != key)
                .cloned()
                .collect(),
        }
    }

    /// Returns the document id.
    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Looks up a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterates fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of fields, not counting the id.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the encoded form: a map with keyword keys, id included.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut pairs = Vec::with_capacity(self.fields.len() + 1);
        pairs.push((Value::keyword(ID_FIELD), self.id.as_value().clone()));
        pairs.extend(
            self.fields
                .iter()
                .map(|(k, v)| (Value::keyword(k.as_str()), v.clone())),
        );
        Value::map(pairs)
    }

    /// Rebuilds a document from its encoded form.
    ///
    /// Fields come back in canonical key order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the value is not a map with
    /// keyword keys and an id entry.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        let pairs = value
            .as_map()
            .ok_or_else(|| CoreError::invalid_operation("document must be a map"))?;

        let mut id = None;
        let mut fields = Vec::with_capacity(pairs.len().saturating_sub(1));
        for (key, value) in pairs {
            let Value::Keyword(name) = key else {
                return Err(CoreError::invalid_operation(format!(
                    "document field key must be a keyword, got {key}"
                )));
            };
            if name == ID_FIELD {
                id = Some(DocumentId::from(value.clone()));
            } else {
                fields.push((name.clone(), value.clone()));
            }
        }

        let id = id.ok_or_else(|| {
            CoreError::invalid_operation(format!("document has no {ID_FIELD} entry"))
        })?;
        Ok(Self { id, fields })
    }

    /// Returns the canonical CBOR encoding.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.to_value().canonical_bytes()
    }

    /// Returns the content hash.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of(&self.canonical_bytes())
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.to_value() == other.to_value()
    }
}

impl Eq for Document {}

impl Hash for Document {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_bytes().hash(state);
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{:{ID_FIELD} {}", self.id)?;
        for (k, v) in &self.fields {
            write!(f, ", :{k} {v}")?;
        }
        f.write_str("}")
    }
}
