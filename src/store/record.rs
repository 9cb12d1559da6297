//! Record envelope
//!
//! `[RecordLen: u16][Key][Tombstone: u8][Payload]`

use std::fmt;
use std::path::Path;

use bytes::{Buf, BufMut};

use crate::error::{CellarError, Result};

use super::{
    FileLayout, LEN_PREFIX_SIZE, MAX_RECORD_BODY, TOMBSTONE_DELETED, TOMBSTONE_LIVE,
    TOMBSTONE_SIZE,
};

/// Id assigned to records of sequenced files
pub type RecordId = u16;

/// Key carried in a record envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    /// Header-assigned id
    Id(RecordId),

    /// Two foreign keys forming a composite key
    Pair(u16, u16),
}

impl RecordKey {
    pub(crate) fn layout(&self) -> FileLayout {
        match self {
            RecordKey::Id(_) => FileLayout::Sequenced,
            RecordKey::Pair(..) => FileLayout::Composite,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Id(id) => write!(f, "{}", id),
            RecordKey::Pair(a, b) => write!(f, "({}, {})", a, b),
        }
    }
}

/// A single record: key, tombstone flag and opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: RecordKey,
    pub tombstone: bool,
    pub payload: Vec<u8>,
}

impl Record {
    /// Create a live record
    pub fn new(key: RecordKey, payload: Vec<u8>) -> Self {
        Self {
            key,
            tombstone: false,
            payload,
        }
    }

    /// Bytes after the length prefix
    pub fn body_len(&self) -> usize {
        self.key.layout().key_size() + TOMBSTONE_SIZE + self.payload.len()
    }

    /// Bytes on disk, length prefix included
    pub fn encoded_len(&self) -> usize {
        LEN_PREFIX_SIZE + self.body_len()
    }

    /// Largest payload a record of this layout can carry
    pub fn max_payload(layout: FileLayout) -> usize {
        MAX_RECORD_BODY - layout.key_size() - TOMBSTONE_SIZE
    }

    /// Position of the tombstone byte relative to the record start
    pub(crate) fn tombstone_offset(layout: FileLayout) -> u64 {
        (LEN_PREFIX_SIZE + layout.key_size()) as u64
    }

    /// Serialize the full envelope
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body_len = self.body_len();
        if body_len > MAX_RECORD_BODY {
            return Err(CellarError::RecordTooLarge {
                len: self.payload.len(),
                max: Self::max_payload(self.key.layout()),
            });
        }

        let mut buf = Vec::with_capacity(LEN_PREFIX_SIZE + body_len);
        buf.put_u16_le(body_len as u16);
        match self.key {
            RecordKey::Id(id) => buf.put_u16_le(id),
            RecordKey::Pair(a, b) => {
                buf.put_u16_le(a);
                buf.put_u16_le(b);
            }
        }
        buf.put_u8(if self.tombstone {
            TOMBSTONE_DELETED
        } else {
            TOMBSTONE_LIVE
        });
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Parse a record body (everything after the length prefix)
    ///
    /// `offset` is the record start and only feeds error messages.
    pub(crate) fn decode_body(
        body: &[u8],
        layout: FileLayout,
        path: &Path,
        offset: u64,
    ) -> Result<Self> {
        let min = layout.key_size() + TOMBSTONE_SIZE;
        if body.len() < min {
            return Err(CellarError::corrupt(
                path,
                offset,
                format!("record length {} is shorter than envelope of {}", body.len(), min),
            ));
        }

        let mut buf = body;
        let key = match layout {
            FileLayout::Sequenced => RecordKey::Id(buf.get_u16_le()),
            FileLayout::Composite => {
                let a = buf.get_u16_le();
                let b = buf.get_u16_le();
                RecordKey::Pair(a, b)
            }
        };
        let tombstone = match buf.get_u8() {
            TOMBSTONE_LIVE => false,
            TOMBSTONE_DELETED => true,
            other => {
                return Err(CellarError::corrupt(
                    path,
                    offset,
                    format!("invalid tombstone byte 0x{:02x}", other),
                ))
            }
        };

        Ok(Self {
            key,
            tombstone,
            payload: buf.to_vec(),
        })
    }
}
