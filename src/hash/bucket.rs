//! Hash buckets

use super::hash_pair;

/// One composite key and the record offset it maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEntry {
    pub first: u64,
    pub second: u64,
    pub offset: u64,
}

impl HashEntry {
    pub(crate) fn hash(&self) -> u64 {
        hash_pair(self.first, self.second)
    }

    pub(crate) fn matches(&self, first: u64, second: u64) -> bool {
        self.first == first && self.second == second
    }
}

/// Physical bucket shared by one or more directory slots
#[derive(Debug, Clone, Default)]
pub(crate) struct Bucket {
    pub(crate) local_depth: u32,
    pub(crate) entries: Vec<HashEntry>,
}

impl Bucket {
    pub(crate) fn with_depth(local_depth: u32) -> Self {
        Self {
            local_depth,
            entries: Vec::new(),
        }
    }

    pub(crate) fn position(&self, first: u64, second: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.matches(first, second))
    }
}
