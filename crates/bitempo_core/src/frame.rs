//! Checksummed frames for append-only files.
//!
//! Both the transaction log and the document store are sequences of frames:
//!
//! ```text
//! | magic (4) | version (2) | kind (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! Integers are little-endian and the CRC covers header and payload.
//!
//! ## Recovery policy
//!
//! A frame cut short by the end of the file (header or payload incomplete) is
//! a write torn by a crash. Scanning stops cleanly before it and reports where
//! the last complete frame ends so the caller can truncate.
//!
//! Anything else is corruption and fatal: wrong magic, unknown kind, a version
//! newer than this build, or a CRC mismatch. No repair is attempted.

use crate::error::{CoreError, CoreResult};
use bitempo_storage::StorageBackend;

/// Current frame format version.
pub const FRAME_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + length (4)
pub const HEADER_SIZE: usize = 11;

/// Trailing CRC size.
pub const CRC_SIZE: usize = 4;

/// Largest payload the 32-bit length field can describe.
pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

/// What a frame holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// A transaction log entry.
    Transaction = 1,
    /// A document body.
    Document = 2,
}

impl FrameKind {
    /// Converts a byte to a frame kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Transaction),
            2 => Some(Self::Document),
            _ => None,
        }
    }

    /// Converts the kind to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Identifies which file a frame belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Leading magic bytes.
    pub magic: [u8; 4],
    /// The only kind this file holds.
    pub kind: FrameKind,
}

impl FrameFormat {
    /// Frames of the transaction log.
    pub const TX_LOG: Self = Self {
        magic: *b"BTXL",
        kind: FrameKind::Transaction,
    };

    /// Frames of the document store.
    pub const DOC_STORE: Self = Self {
        magic: *b"BDOC",
        kind: FrameKind::Document,
    };

    /// Wraps `payload` in a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not fit the 4-byte length field.
    pub fn encode(&self, payload: &[u8]) -> CoreResult<Vec<u8>> {
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_operation("frame payload too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&self.magic);
        data.extend_from_slice(&FRAME_VERSION.to_le_bytes());
        data.push(self.kind.as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(payload);

        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }

    /// Returns an iterator over the frames of `backend` from `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be read.
    pub fn frames<'a>(
        &self,
        backend: &'a dyn StorageBackend,
        start: u64,
    ) -> CoreResult<FrameIterator<'a>> {
        Ok(FrameIterator {
            backend,
            format: *self,
            total_size: backend.size()?,
            offset: start,
            finished: false,
        })
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Offset of the frame's first byte.
    pub offset: u64,
    /// Offset just past the frame's CRC.
    pub end: u64,
    /// Frame payload.
    pub payload: Vec<u8>,
}

/// Reads frames one at a time.
///
/// Yields `Ok(frame)` for each complete frame, stops at a torn tail, and
/// yields a single `Err` on corruption.
pub struct FrameIterator<'a> {
    backend: &'a dyn StorageBackend,
    format: FrameFormat,
    total_size: u64,
    offset: u64,
    finished: bool,
}

impl FrameIterator<'_> {
    /// Offset just past the last complete frame read so far.
    ///
    /// After the iterator is exhausted without error this is where valid data
    /// ends; anything beyond it is a torn write.
    #[must_use]
    pub fn valid_end(&self) -> u64 {
        self.offset
    }

    /// Total backend size when the iterator was created.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    fn read_next(&mut self) -> CoreResult<Option<Frame>> {
        let start = self.offset;
        let remaining = self.total_size.saturating_sub(start);

        if remaining < HEADER_SIZE as u64 {
            return Ok(None);
        }
        let header = self.backend.read_at(start, HEADER_SIZE)?;

        if header[0..4] != self.format.magic {
            return Err(CoreError::log_corruption(format!(
                "invalid magic at offset {start}"
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > FRAME_VERSION {
            return Err(CoreError::log_corruption(format!(
                "unsupported version {version} at offset {start}"
            )));
        }

        let kind_byte = header[6];
        if FrameKind::from_byte(kind_byte) != Some(self.format.kind) {
            return Err(CoreError::log_corruption(format!(
                "unexpected frame kind {kind_byte} at offset {start}"
            )));
        }

        let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]);
        let total_len = (HEADER_SIZE + CRC_SIZE) as u64 + u64::from(payload_len);
        if remaining < total_len {
            return Ok(None);
        }

        let body = self
            .backend
            .read_at(start + HEADER_SIZE as u64, payload_len as usize + CRC_SIZE)?;
        let (payload, crc_bytes) = body.split_at(payload_len as usize);
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

        let mut computed = Crc32::new();
        computed.update(&header);
        computed.update(payload);
        let computed = computed.finish();

        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        self.offset = start + total_len;
        Ok(Some(Frame {
            offset: start,
            end: self.offset,
            payload: payload.to_vec(),
        }))
    }
}

impl Iterator for FrameIterator<'_> {
    type Item = CoreResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_next() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Incremental CRC32 (IEEE polynomial).
#[derive(Debug, Clone, Copy)]
pub struct Crc32(u32);

impl Crc32 {
    /// Starts a new checksum.
    #[must_use]
    pub const fn new() -> Self {
        Self(0xFFFF_FFFF)
    }

    /// Feeds bytes into the checksum.
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let index = ((self.0 ^ u32::from(byte)) & 0xFF) as usize;
            self.0 = (self.0 >> 8) ^ CRC32_TABLE[index];
        }
    }

    /// Returns the final checksum.
    #[must_use]
    pub const fn finish(self) -> u32 {
        !self.0
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the CRC32 of `data` in one go.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finish()
}
