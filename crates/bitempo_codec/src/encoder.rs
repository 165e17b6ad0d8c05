//! Canonical CBOR encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::{cmp_encoded, Value};
use crate::{TAG_KEYWORD, TAG_UUID};

/// Encode a value to canonical CBOR bytes.
///
/// Output follows the core deterministic encoding of RFC 8949 §4.2:
/// - map keys sorted by encoded form (length-first, then bytewise)
/// - shortest integer and length arguments
/// - no indefinite-length items
///
/// # Errors
///
/// Returns [`CodecError::NestingTooDeep`] if arrays and maps nest deeper than
/// the decoder would accept, and [`CodecError::InvalidStructure`] if any map,
/// at any depth, holds two keys with the same encoding.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A canonical CBOR encoder that can write several values back to back.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encode a value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NestingTooDeep`] for over-nested values and
    /// [`CodecError::InvalidStructure`] for maps with duplicate keys. Nothing
    /// is written on error.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        value.validate()?;
        write_unbounded(&mut self.buffer, value);
        Ok(())
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }
}

/// Fails if any map inside `value` repeats a key. The decoder refuses such
/// maps.
pub(crate) fn check_distinct_keys(value: &Value) -> CodecResult<()> {
    match value {
        Value::Array(items) => items.iter().try_for_each(check_distinct_keys),
        Value::Map(pairs) => {
            let mut keys: Vec<Vec<u8>> =
                pairs.iter().map(|(key, _)| key.canonical_bytes()).collect();
            keys.sort_by(|a, b| cmp_encoded(a, b));
            if keys.windows(2).any(|w| w[0] == w[1]) {
                return Err(CodecError::invalid_structure("duplicate map key"));
            }
            pairs.iter().try_for_each(|(key, value)| {
                check_distinct_keys(key)?;
                check_distinct_keys(value)
            })
        }
        _ => Ok(()),
    }
}

/// Writes `value` without checking nesting depth or key uniqueness.
pub(crate) fn write_unbounded(buf: &mut Vec<u8>, value: &Value) {
    match value {
        // simple values 20, 21, 22
        Value::Null => buf.push(0xf6),
        Value::Bool(false) => buf.push(0xf4),
        Value::Bool(true) => buf.push(0xf5),
        Value::Integer(n) => write_integer(buf, *n),
        Value::Bytes(bytes) => {
            write_head(buf, 2, bytes.len() as u64);
            buf.extend_from_slice(bytes);
        }
        Value::Text(text) => write_text(buf, text),
        Value::Keyword(name) => {
            write_head(buf, 6, TAG_KEYWORD);
            write_text(buf, name);
        }
        Value::Uuid(bytes) => {
            write_head(buf, 6, TAG_UUID);
            write_head(buf, 2, 16);
            buf.extend_from_slice(bytes);
        }
        Value::Array(items) => {
            write_head(buf, 4, items.len() as u64);
            for item in items {
                write_unbounded(buf, item);
            }
        }
        Value::Map(pairs) => {
            let mut entries: Vec<(Vec<u8>, &Value)> = pairs
                .iter()
                .map(|(key, value)| (key.canonical_bytes(), value))
                .collect();
            entries.sort_by(|a, b| cmp_encoded(&a.0, &b.0));

            write_head(buf, 5, entries.len() as u64);
            for (key, value) in entries {
                buf.extend_from_slice(&key);
                write_unbounded(buf, value);
            }
        }
    }
}

#[allow(clippy::cast_sign_loss)]
fn write_integer(buf: &mut Vec<u8>, n: i64) {
    if n >= 0 {
        write_head(buf, 0, n as u64);
    } else {
        // major type 1 carries -1 - n, which is non-negative for any negative n
        write_head(buf, 1, (-1 - n) as u64);
    }
}

fn write_text(buf: &mut Vec<u8>, text: &str) {
    write_head(buf, 3, text.len() as u64);
    buf.extend_from_slice(text.as_bytes());
}

#[allow(clippy::cast_possible_truncation)]
fn write_head(buf: &mut Vec<u8>, major_type: u8, argument: u64) {
    let mt = major_type << 5;

    if argument < 24 {
        buf.push(mt | argument as u8);
    } else if argument <= u64::from(u8::MAX) {
        buf.push(mt | 24);
        buf.push(argument as u8);
    } else if argument <= u64::from(u16::MAX) {
        buf.push(mt | 25);
        buf.extend_from_slice(&(argument as u16).to_be_bytes());
    } else if argument <= u64::from(u32::MAX) {
        buf.push(mt | 26);
        buf.extend_from_slice(&(argument as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&argument.to_be_bytes());
    }
}
