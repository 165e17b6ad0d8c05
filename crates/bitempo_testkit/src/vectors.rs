//! Format test vectors for bitempo.
//!
//! The vectors live in `vectors/bitempo_vectors.json` so that other
//! implementations of the document hash and file formats can check
//! themselves against the same bytes.

use serde::{Deserialize, Serialize};

const VECTORS_JSON: &str = include_str!("../vectors/bitempo_vectors.json");

/// A document and its expected canonical encoding and content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHashVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Canonical CBOR of the document (hex).
    pub canonical_hex: String,
    /// SHA-256 of the canonical bytes (hex).
    pub content_hash: String,
}

/// The exact bytes a file holds after a known sequence of writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// The whole frame, header and checksum included (hex).
    pub frame_hex: String,
}

/// Every vector set, as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllTestVectors {
    /// Document hashing vectors.
    pub content_hash: Vec<ContentHashVector>,
    /// Log and document store frame vectors.
    pub frames: Vec<FrameVector>,
}

/// Loads the checked-in vectors.
pub fn all_vectors() -> AllTestVectors {
    serde_json::from_str(VECTORS_JSON).expect("Checked-in vectors are valid JSON")
}

/// Document hashing vectors.
pub fn content_hash_vectors() -> Vec<ContentHashVector> {
    all_vectors().content_hash
}

/// Frame vectors.
pub fn frame_vectors() -> Vec<FrameVector> {
    all_vectors().frames
}

/// Looks up a vector set entry by id.
pub fn find_frame_vector(id: &str) -> Option<FrameVector> {
    frame_vectors().into_iter().find(|v| v.id == id)
}

/// Serializes all vectors as pretty JSON.
pub fn all_vectors_json() -> String {
    serde_json::to_string_pretty(&all_vectors()).expect("Failed to serialize vectors")
}
