//! # Bitempo Codec
//!
//! Canonical CBOR for documents and transaction-log entries.
//!
//! Every document is content-addressed by hashing its encoding, so the codec
//! must be deterministic:
//! - Maps are sorted by encoded key (length-first, then bytewise)
//! - Integers and lengths use the shortest encoding
//! - No floats
//! - No indefinite-length items
//!
//! Two tags extend the plain data model. Tag 39 marks a keyword such as
//! `:person/alice` and tag 37 marks a 16-byte UUID. Both commonly appear as
//! document ids. Any other tag is rejected by the decoder.
//!
//! ## Usage
//!
//! ```
//! use bitempo_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let value = Value::map(vec![
//!     (Value::keyword("name"), Value::from("Ivan")),
//!     (Value::keyword("age"), Value::Integer(30)),
//! ]);
//! let bytes = to_canonical_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// CBOR tag for a 16-byte UUID.
pub const TAG_UUID: u64 = 37;

/// CBOR tag for a keyword (symbolic identifier).
pub const TAG_KEYWORD: u64 = 39;

/// Deepest nesting of arrays and maps the codec accepts.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Trait for types that can be encoded to canonical CBOR.
pub trait Encode {
    /// Encode this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}
