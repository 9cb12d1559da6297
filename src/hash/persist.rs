//! Extensible hash persistence
//!
//! Buckets are written once each; the directory is written as indices into
//! that bucket table.

use std::fs;
use std::path::Path;

use bytes::{Buf, BufMut};

use crate::error::{CellarError, IoContext, Result};
use crate::store::atomic;

use super::bucket::{Bucket, HashEntry};
use super::index::{ExtensibleHashIndex, MAX_GLOBAL_DEPTH};

const HEADER_SIZE: usize = 12;
const BUCKET_HEADER_SIZE: usize = 8;
const ENTRY_SIZE: usize = 24;
const CHECKSUM_SIZE: usize = 4;

impl ExtensibleHashIndex {
    /// Serialize into the on-disk format
    pub fn encode(&self) -> Vec<u8> {
        let unique = self.unique_buckets();

        // Arena id → position in the written bucket table
        let mut table_pos = vec![u32::MAX; unique.iter().max().map_or(0, |m| m + 1)];
        for (pos, &id) in unique.iter().enumerate() {
            table_pos[id] = pos as u32;
        }

        let mut buf = Vec::with_capacity(
            HEADER_SIZE + unique.len() * BUCKET_HEADER_SIZE + self.len() * ENTRY_SIZE
                + self.directory_len() * 4
                + CHECKSUM_SIZE,
        );
        buf.put_u32_le(self.global_depth());
        buf.put_u32_le(self.bucket_capacity() as u32);
        buf.put_u32_le(unique.len() as u32);

        for &id in &unique {
            let bucket = self.bucket(id);
            buf.put_u32_le(bucket.local_depth);
            buf.put_u32_le(bucket.entries.len() as u32);
            for entry in &bucket.entries {
                buf.put_u64_le(entry.first);
                buf.put_u64_le(entry.second);
                buf.put_u64_le(entry.offset);
            }
        }

        for &id in self.directory() {
            buf.put_u32_le(table_pos[id]);
        }

        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);
        buf
    }

    /// Write the index to `path` through `<path>.tmp`
    pub fn save(&self, path: &Path) -> Result<()> {
        atomic::replace_file(path, &self.encode())?;
        tracing::debug!(
            "Saved hash index ({} entries, depth {}) to {}",
            self.len(),
            self.global_depth(),
            path.display()
        );
        Ok(())
    }

    /// Load an index file, removing a stale `<path>.tmp` first
    pub fn load(path: &Path) -> Result<Self> {
        atomic::remove_stale_tmp(path)?;
        let bytes = fs::read(path).io_context("read index file", path)?;
        Self::decode(&bytes, path)
    }

    /// Parse the on-disk format, checking every structural invariant
    pub fn decode(bytes: &[u8], path: &Path) -> Result<Self> {
        let corrupt = |offset: usize, reason: String| CellarError::corrupt(path, offset as u64, reason);

        if bytes.len() < HEADER_SIZE + CHECKSUM_SIZE {
            return Err(corrupt(
                0,
                format!("hash index file is {} bytes, smaller than its header", bytes.len()),
            ));
        }

        let (body, mut trailer) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
        let stored_crc = trailer.get_u32_le();
        let actual_crc = crc32fast::hash(body);
        if stored_crc != actual_crc {
            return Err(corrupt(
                body.len(),
                format!(
                    "hash index checksum mismatch: stored {:08x}, computed {:08x}",
                    stored_crc, actual_crc
                ),
            ));
        }

        let mut buf = body;
        let global_depth = buf.get_u32_le();
        let bucket_capacity = buf.get_u32_le() as usize;
        let bucket_count = buf.get_u32_le() as usize;

        if global_depth > MAX_GLOBAL_DEPTH {
            return Err(corrupt(0, format!("global depth {} too large", global_depth)));
        }
        if bucket_capacity == 0 {
            return Err(corrupt(4, "bucket size is zero".to_string()));
        }
        let directory_len = 1usize << global_depth;
        if bucket_count == 0 || bucket_count > directory_len {
            return Err(corrupt(
                8,
                format!(
                    "{} buckets cannot back a directory of {} slots",
                    bucket_count, directory_len
                ),
            ));
        }

        let mut buckets = Vec::with_capacity(bucket_count);
        for _ in 0..bucket_count {
            let at = body.len() - buf.remaining();
            if buf.remaining() < BUCKET_HEADER_SIZE {
                return Err(corrupt(at, "truncated bucket header".to_string()));
            }
            let local_depth = buf.get_u32_le();
            let entry_count = buf.get_u32_le() as usize;

            if local_depth > global_depth {
                return Err(corrupt(
                    at,
                    format!(
                        "bucket local depth {} exceeds global depth {}",
                        local_depth, global_depth
                    ),
                ));
            }
            if entry_count > bucket_capacity {
                return Err(corrupt(
                    at,
                    format!("bucket holds {} entries, capacity is {}", entry_count, bucket_capacity),
                ));
            }
            if buf.remaining() < entry_count * ENTRY_SIZE {
                return Err(corrupt(at, "truncated bucket entries".to_string()));
            }

            let entries = (0..entry_count)
                .map(|_| HashEntry {
                    first: buf.get_u64_le(),
                    second: buf.get_u64_le(),
                    offset: buf.get_u64_le(),
                })
                .collect();
            buckets.push(Bucket {
                local_depth,
                entries,
            });
        }

        let dir_at = body.len() - buf.remaining();
        if buf.remaining() != directory_len * 4 {
            return Err(corrupt(
                dir_at,
                format!(
                    "directory needs {} bytes, {} remain",
                    directory_len * 4,
                    buf.remaining()
                ),
            ));
        }
        let mut directory = Vec::with_capacity(directory_len);
        for _ in 0..directory_len {
            let id = buf.get_u32_le() as usize;
            if id >= bucket_count {
                return Err(corrupt(dir_at, format!("directory points at missing bucket {}", id)));
            }
            directory.push(id);
        }
        let mut referenced = vec![false; bucket_count];
        for &id in &directory {
            referenced[id] = true;
        }
        if let Some(orphan) = referenced.iter().position(|r| !r) {
            return Err(corrupt(dir_at, format!("bucket {} is not referenced by any slot", orphan)));
        }

        // Every entry must live in a bucket its hash actually selects.
        for (slot, &id) in directory.iter().enumerate() {
            let bucket = &buckets[id];
            let mask = (1u64 << bucket.local_depth) - 1;
            if let Some(stray) = bucket
                .entries
                .iter()
                .find(|e| (e.hash() ^ slot as u64) & mask != 0)
            {
                return Err(corrupt(
                    dir_at,
                    format!(
                        "entry ({}, {}) is filed under slot {} its hash does not select",
                        stray.first, stray.second, slot
                    ),
                ));
            }
        }

        Ok(ExtensibleHashIndex::from_parts(
            global_depth,
            bucket_capacity,
            directory,
            buckets,
        ))
    }
}
