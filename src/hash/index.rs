//! Extensible hash index

use std::fmt::Write as _;

use crate::error::{CellarError, Result};

use super::bucket::{Bucket, HashEntry};
use super::hash_pair;

/// Directory never grows past `2^MAX_GLOBAL_DEPTH` slots
pub const MAX_GLOBAL_DEPTH: u32 = 24;

/// Directory-based dynamic hash index over `(u64, u64)` keys
#[derive(Debug, Clone)]
pub struct ExtensibleHashIndex {
    global_depth: u32,
    bucket_capacity: usize,
    /// Slot → bucket arena id
    directory: Vec<usize>,
    buckets: Vec<Bucket>,
    len: usize,
}

impl ExtensibleHashIndex {
    /// Empty index: one slot, one bucket, depth 0
    pub fn new(bucket_capacity: usize) -> Self {
        Self {
            global_depth: 0,
            bucket_capacity: bucket_capacity.max(1),
            directory: vec![0],
            buckets: vec![Bucket::with_depth(0)],
            len: 0,
        }
    }

    /// Build an index by inserting entries one by one
    pub fn from_entries(
        bucket_capacity: usize,
        entries: impl IntoIterator<Item = HashEntry>,
    ) -> Result<Self> {
        let mut index = Self::new(bucket_capacity);
        for entry in entries {
            index.insert(entry.first, entry.second, entry.offset)?;
        }
        Ok(index)
    }

    /// Assemble an index from already-validated parts (used by `decode`)
    pub(crate) fn from_parts(
        global_depth: u32,
        bucket_capacity: usize,
        directory: Vec<usize>,
        buckets: Vec<Bucket>,
    ) -> Self {
        let len = buckets.iter().map(|b| b.entries.len()).sum();
        Self {
            global_depth,
            bucket_capacity,
            directory,
            buckets,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.bucket_capacity);
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Insert a new composite key, splitting buckets as needed
    pub fn insert(&mut self, first: u64, second: u64, offset: u64) -> Result<()> {
        if self.search(first, second).is_some() {
            return Err(CellarError::duplicate(
                "hash index",
                format!("({}, {})", first, second),
            ));
        }

        let hash = hash_pair(first, second);
        loop {
            let bucket_id = self.directory[self.slot_for(hash)];
            let bucket = &mut self.buckets[bucket_id];
            if bucket.entries.len() < self.bucket_capacity {
                bucket.entries.push(HashEntry {
                    first,
                    second,
                    offset,
                });
                self.len += 1;
                return Ok(());
            }
            self.split_bucket(bucket_id)?;
        }
    }

    pub fn search(&self, first: u64, second: u64) -> Option<u64> {
        let bucket = &self.buckets[self.directory[self.slot_for(hash_pair(first, second))]];
        bucket
            .position(first, second)
            .map(|pos| bucket.entries[pos].offset)
    }

    /// Remove a key, returning its offset. Buckets never merge.
    pub fn delete(&mut self, first: u64, second: u64) -> Option<u64> {
        let slot = self.slot_for(hash_pair(first, second));
        let bucket = &mut self.buckets[self.directory[slot]];
        let pos = bucket.position(first, second)?;
        let entry = bucket.entries.swap_remove(pos);
        self.len -= 1;
        Some(entry.offset)
    }

    /// Every entry, visiting each physical bucket once
    pub fn get_all(&self) -> Vec<HashEntry> {
        self.collect_where(|_| true)
    }

    /// Entries whose first key component equals `first`
    pub fn get_by_first_key(&self, first: u64) -> Vec<HashEntry> {
        self.collect_where(|e| e.first == first)
    }

    /// Entries whose second key component equals `second`
    pub fn get_by_second_key(&self, second: u64) -> Vec<HashEntry> {
        self.collect_where(|e| e.second == second)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    pub fn bucket_capacity(&self) -> usize {
        self.bucket_capacity
    }

    pub fn directory_len(&self) -> usize {
        self.directory.len()
    }

    /// Local depth of the bucket behind directory slot `slot`
    pub fn local_depth_of_slot(&self, slot: usize) -> Option<u32> {
        self.directory
            .get(slot)
            .map(|&id| self.buckets[id].local_depth)
    }

    /// Number of distinct buckets reachable from the directory
    pub fn unique_bucket_count(&self) -> usize {
        self.unique_buckets().len()
    }

    /// Directory → bucket mapping with local depths and entries
    pub fn dump(&self) -> String {
        let unique = self.unique_buckets();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Extensible hash: global_depth={} bucket_capacity={} entries={} buckets={}",
            self.global_depth,
            self.bucket_capacity,
            self.len,
            unique.len()
        );

        for (slot, id) in self.directory.iter().enumerate() {
            let bucket_no = unique.iter().position(|u| u == id).unwrap_or(usize::MAX);
            let _ = writeln!(
                out,
                "  slot {:0width$b} -> bucket #{}",
                slot,
                bucket_no,
                width = self.global_depth.max(1) as usize
            );
        }
        for (no, id) in unique.iter().enumerate() {
            let bucket = &self.buckets[*id];
            let entries: Vec<String> = bucket
                .entries
                .iter()
                .map(|e| format!("({}, {})@{}", e.first, e.second, e.offset))
                .collect();
            let _ = writeln!(
                out,
                "  bucket #{} local_depth={} [{}]",
                no,
                bucket.local_depth,
                entries.join(", ")
            );
        }
        out
    }

    // =========================================================================
    // Crate-internal accessors (persistence)
    // =========================================================================

    /// Bucket arena ids in first-seen directory order, each exactly once
    pub(crate) fn unique_buckets(&self) -> Vec<usize> {
        let mut seen = vec![false; self.buckets.len()];
        let mut unique = Vec::new();
        for &id in &self.directory {
            if !seen[id] {
                seen[id] = true;
                unique.push(id);
            }
        }
        unique
    }

    pub(crate) fn bucket(&self, id: usize) -> &Bucket {
        &self.buckets[id]
    }

    pub(crate) fn directory(&self) -> &[usize] {
        &self.directory
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn slot_for(&self, hash: u64) -> usize {
        let mask = (1u64 << self.global_depth) - 1;
        (hash & mask) as usize
    }

    fn collect_where(&self, keep: impl Fn(&HashEntry) -> bool) -> Vec<HashEntry> {
        self.unique_buckets()
            .into_iter()
            .flat_map(|id| self.buckets[id].entries.iter())
            .filter(|e| keep(e))
            .copied()
            .collect()
    }

    /// Split one full bucket on hash bit `local_depth`
    fn split_bucket(&mut self, bucket_id: usize) -> Result<()> {
        let local_depth = self.buckets[bucket_id].local_depth;

        if local_depth == self.global_depth {
            if self.global_depth >= MAX_GLOBAL_DEPTH {
                return Err(CellarError::IndexCapacity(format!(
                    "bucket at depth {} cannot split further",
                    self.global_depth
                )));
            }
            self.directory.extend_from_within(..);
            self.global_depth += 1;
        }

        let bit = 1u64 << local_depth;
        let sibling_id = self.buckets.len();
        let entries = std::mem::take(&mut self.buckets[bucket_id].entries);
        let (high, low): (Vec<HashEntry>, Vec<HashEntry>) =
            entries.into_iter().partition(|e| e.hash() & bit != 0);

        self.buckets[bucket_id] = Bucket {
            local_depth: local_depth + 1,
            entries: low,
        };
        self.buckets.push(Bucket {
            local_depth: local_depth + 1,
            entries: high,
        });

        for (slot, target) in self.directory.iter_mut().enumerate() {
            if *target == bucket_id && (slot as u64) & bit != 0 {
                *target = sibling_id;
            }
        }
        Ok(())
    }
}
