//! B+ tree persistence
//!
//! The tree shape is never written; only the sorted pairs are.

use std::fs;
use std::path::Path;

use bytes::{Buf, BufMut};

use crate::error::{CellarError, IoContext, Result};
use crate::store::atomic;

use super::tree::BPlusTree;
use super::{CHECKSUM_SIZE, ENTRY_SIZE, HEADER_SIZE, MAGIC, VERSION};

impl BPlusTree {
    /// Serialize every pair into the on-disk format
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.len() * ENTRY_SIZE + CHECKSUM_SIZE);
        buf.put_slice(MAGIC);
        buf.put_u8(VERSION);
        buf.put_u32_le(self.order() as u32);
        buf.put_u32_le(self.len() as u32);
        for (key, offset) in self.iter() {
            buf.put_u32_le(key);
            buf.put_i64_le(offset as i64);
        }
        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);
        buf
    }

    /// Write the index to `path` through `<path>.tmp`
    pub fn save(&self, path: &Path) -> Result<()> {
        atomic::replace_file(path, &self.encode())?;
        tracing::debug!("Saved B+ tree index ({} keys) to {}", self.len(), path.display());
        Ok(())
    }

    /// Load an index file, rebuilding the live tree with `order`
    ///
    /// A stale `<path>.tmp` from an interrupted save is removed first. The
    /// order recorded in the file is informational; the tree shape is
    /// re-derived from the pairs.
    pub fn load(path: &Path, order: usize) -> Result<Self> {
        atomic::remove_stale_tmp(path)?;
        let bytes = fs::read(path).io_context("read index file", path)?;
        Self::decode(&bytes, order, path)
    }

    /// Parse the on-disk format. `path` only feeds error messages.
    pub fn decode(bytes: &[u8], order: usize, path: &Path) -> Result<Self> {
        if bytes.len() < HEADER_SIZE + CHECKSUM_SIZE {
            return Err(CellarError::corrupt(
                path,
                0,
                format!("index file is {} bytes, smaller than its header", bytes.len()),
            ));
        }

        let (body, mut trailer) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
        let stored_crc = trailer.get_u32_le();
        let actual_crc = crc32fast::hash(body);
        if stored_crc != actual_crc {
            return Err(CellarError::corrupt(
                path,
                body.len() as u64,
                format!(
                    "index checksum mismatch: stored {:08x}, computed {:08x}",
                    stored_crc, actual_crc
                ),
            ));
        }

        let mut buf = body;
        if &buf[..MAGIC.len()] != MAGIC {
            return Err(CellarError::corrupt(
                path,
                0,
                format!("invalid index magic {:?}", &buf[..MAGIC.len()]),
            ));
        }
        buf.advance(MAGIC.len());

        let version = buf.get_u8();
        if version != VERSION {
            return Err(CellarError::corrupt(
                path,
                4,
                format!("unsupported index version {}", version),
            ));
        }

        let stored_order = buf.get_u32_le() as usize;
        let count = buf.get_u32_le() as usize;
        if buf.remaining() != count * ENTRY_SIZE {
            return Err(CellarError::corrupt(
                path,
                HEADER_SIZE as u64,
                format!(
                    "index declares {} entries but holds {} bytes of entries",
                    count,
                    buf.remaining()
                ),
            ));
        }
        if stored_order != order {
            tracing::debug!(
                "Index {} was written with order {}, loading with order {}",
                path.display(),
                stored_order,
                order
            );
        }

        let mut tree = BPlusTree::new(order);
        let mut previous: Option<u32> = None;
        for i in 0..count {
            let entry_offset = (HEADER_SIZE + i * ENTRY_SIZE) as u64;
            let key = buf.get_u32_le();
            let offset = buf.get_i64_le();

            if previous.is_some_and(|p| p >= key) {
                return Err(CellarError::corrupt(
                    path,
                    entry_offset,
                    format!("index keys out of order at key {}", key),
                ));
            }
            if offset < 0 {
                return Err(CellarError::corrupt(
                    path,
                    entry_offset,
                    format!("negative offset {} for key {}", offset, key),
                ));
            }

            tree.insert(key, offset as u64)?;
            previous = Some(key);
        }

        Ok(tree)
    }
}
