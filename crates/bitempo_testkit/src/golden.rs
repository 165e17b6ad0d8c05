//! Golden test utilities for format verification.
//!
//! Compares encoded log frames, document bodies and hashes against files
//! checked in under `vectors/`.

use std::fs;
use std::path::{Path, PathBuf};

/// A golden test that compares output against expected files.
pub struct GoldenTest {
    name: String,
    golden_dir: PathBuf,
    update_mode: bool,
}

impl GoldenTest {
    /// Creates a new golden test.
    ///
    /// # Arguments
    ///
    /// * `name` - Name of the test (used for file naming)
    /// * `golden_dir` - Directory containing golden files
    pub fn new(name: impl Into<String>, golden_dir: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            golden_dir: golden_dir.as_ref().to_path_buf(),
            update_mode: std::env::var("UPDATE_GOLDEN").is_ok(),
        }
    }

    /// Creates a golden test over this crate's `vectors/` directory.
    pub fn with_default_dir(name: impl Into<String>) -> Self {
        Self::new(name, default_golden_dir())
    }

    /// Asserts that the given bytes match the golden file.
    ///
    /// With `UPDATE_GOLDEN` set the file is rewritten instead.
    pub fn assert_bytes(&self, suffix: &str, actual: &[u8]) {
        let path = self.file_path(suffix);

        if self.update_mode {
            write_golden_file(&path, actual);
            return;
        }

        let Ok(expected) = fs::read(&path) else {
            panic!(
                "Golden file not found: {path:?}\n\
                 Run with UPDATE_GOLDEN=1 to create it.\n\
                 Actual bytes (hex): {}",
                hex_encode(actual)
            );
        };

        assert!(
            actual == expected.as_slice(),
            "Golden test '{}' failed for '{suffix}':\n\
             Expected ({} bytes): {}\n\
             Actual ({} bytes): {}\n\
             Run with UPDATE_GOLDEN=1 to update.",
            self.name,
            expected.len(),
            hex_encode(&expected),
            actual.len(),
            hex_encode(actual)
        );
    }

    /// Asserts that the given string matches the golden file.
    pub fn assert_text(&self, suffix: &str, actual: &str) {
        let path = self.file_path(suffix);

        if self.update_mode {
            write_golden_file(&path, actual.as_bytes());
            return;
        }

        let Ok(expected) = fs::read_to_string(&path) else {
            panic!(
                "Golden file not found: {path:?}\n\
                 Run with UPDATE_GOLDEN=1 to create it.\n\
                 Actual:\n{actual}"
            );
        };

        assert!(
            actual == expected,
            "Golden test '{}' failed for '{suffix}':\n\
             --- Expected ---\n{expected}\n\
             --- Actual ---\n{actual}\n\
             Run with UPDATE_GOLDEN=1 to update.",
            self.name
        );
    }

    fn file_path(&self, suffix: &str) -> PathBuf {
        let filename = if suffix.is_empty() {
            format!("{}.golden", self.name)
        } else {
            format!("{}_{suffix}.golden", self.name)
        };
        self.golden_dir.join(filename)
    }
}

/// The `vectors/` directory next to this crate's manifest.
pub fn default_golden_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("vectors")
}

fn write_golden_file(path: &Path, data: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create golden directory");
    }
    fs::write(path, data).expect("Failed to write golden file");
    eprintln!("Updated golden file: {path:?}");
}

/// Encodes bytes as lowercase hex.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decodes a hex string, ignoring whitespace.
///
/// # Panics
///
/// Panics on odd length or non-hex characters.
pub fn hex_decode(hex: &str) -> Vec<u8> {
    let digits: Vec<u8> = hex.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    assert!(digits.len() % 2 == 0, "Hex string has odd length");
    digits
        .chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).expect("Hex digits are ASCII");
            u8::from_str_radix(text, 16).expect("Invalid hex digit")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_hex_roundtrip() {
        let data = vec![0x00, 0x01, 0xab, 0xff];
        assert_eq!(hex_encode(&data), "0001abff");
        assert_eq!(hex_decode("00 01\nab ff"), data);
    }

    #[test]
    fn test_golden_bytes_match() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("frame_header.golden"), [1, 2, 3]).unwrap();

        let golden = GoldenTest::new("frame", dir.path());
        golden.assert_bytes("header", &[1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "Golden test 'frame' failed")]
    fn test_golden_bytes_mismatch() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("frame.golden"), [1, 2, 3]).unwrap();

        let golden = GoldenTest {
            name: "frame".into(),
            golden_dir: dir.path().to_path_buf(),
            update_mode: false,
        };
        golden.assert_bytes("", &[1, 2, 4]);
    }
}
