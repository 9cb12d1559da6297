//! Data file header
//!
//! Fixed-size counters at the start of every data file. Because the size
//! never changes, the header is always rewritten in place.

use std::path::Path;

use bytes::{Buf, BufMut};

use crate::error::{CellarError, Result};

/// Which header/key variant a data file uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileLayout {
    /// 3-field header, records keyed by a header-assigned u16 id
    Sequenced,

    /// 2-field header, records keyed by a (u16, u16) pair
    Composite,
}

impl FileLayout {
    /// Header size in bytes
    pub fn header_size(self) -> u64 {
        match self {
            FileLayout::Sequenced => 12,
            FileLayout::Composite => 8,
        }
    }

    /// Size of the record key inside the envelope
    pub(crate) fn key_size(self) -> usize {
        match self {
            FileLayout::Sequenced => 2,
            FileLayout::Composite => 4,
        }
    }
}

/// Counters stored at the start of a data file
///
/// `active_count + tombstone_count` equals the number of records physically
/// present in the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileHeader {
    /// Records whose tombstone is not set
    pub active_count: u32,

    /// Records whose tombstone is set
    pub tombstone_count: u32,

    /// Next id to hand out (always 0 for composite files)
    pub next_id: u32,
}

impl FileHeader {
    /// Total records physically present in the file
    pub fn record_count(&self) -> u64 {
        self.active_count as u64 + self.tombstone_count as u64
    }

    pub(crate) fn encode(&self, layout: FileLayout) -> Vec<u8> {
        let mut buf = Vec::with_capacity(layout.header_size() as usize);
        buf.put_u32_le(self.active_count);
        buf.put_u32_le(self.tombstone_count);
        if layout == FileLayout::Sequenced {
            buf.put_u32_le(self.next_id);
        }
        buf
    }

    pub(crate) fn decode(bytes: &[u8], layout: FileLayout, path: &Path) -> Result<Self> {
        let size = layout.header_size() as usize;
        if bytes.len() < size {
            return Err(CellarError::corrupt(
                path,
                0,
                format!("header needs {} bytes, file has {}", size, bytes.len()),
            ));
        }

        let mut buf = &bytes[..size];
        let active_count = buf.get_u32_le();
        let tombstone_count = buf.get_u32_le();
        let next_id = match layout {
            FileLayout::Sequenced => buf.get_u32_le(),
            FileLayout::Composite => 0,
        };

        Ok(Self {
            active_count,
            tombstone_count,
            next_id,
        })
    }
}
