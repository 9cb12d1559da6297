//! Configuration for CellarDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{CellarError, Result};

/// Smallest B+ tree order that still splits internal nodes into two
/// non-empty halves.
pub const MIN_BTREE_ORDER: usize = 4;

/// Main configuration for a CellarDB instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data and index files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── menu_items.db / menu_items.idx
    ///     ├── orders.db / orders.idx
    ///     ├── promotions.db / promotions.idx
    ///     └── order_promotions.db / order_promotions.hidx
    pub data_dir: PathBuf,

    /// Whether appends and tombstone writes are fsynced
    pub sync_mode: SyncMode,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// B+ tree order (max children per internal node; leaves hold order - 1 keys)
    pub btree_order: usize,

    /// Max entries per extensible hash bucket before it splits
    pub hash_bucket_capacity: usize,
}

/// Data file sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// fsync after every mutation (safest, slowest)
    Always,

    /// Flush to the OS only; the kernel decides when bytes reach disk
    OsBuffered,
}

/// How an entity flips a record's tombstone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStrategy {
    /// Seek to the tombstone byte and overwrite it
    InPlace,

    /// Rewrite the whole file through `<path>.tmp` and rename over the original
    Rewrite,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./cellar_data"),
            sync_mode: SyncMode::Always,
            btree_order: 32,
            hash_bucket_capacity: 8,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject values the indexes cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.btree_order < MIN_BTREE_ORDER {
            return Err(CellarError::Config(format!(
                "btree_order must be at least {}, got {}",
                MIN_BTREE_ORDER, self.btree_order
            )));
        }
        if self.hash_bucket_capacity == 0 {
            return Err(CellarError::Config(
                "hash_bucket_capacity must be at least 1".to_string(),
            ));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(CellarError::Config("data_dir must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the data file sync mode
    pub fn sync_mode(mut self, mode: SyncMode) -> Self {
        self.config.sync_mode = mode;
        self
    }

    /// Set the B+ tree order
    pub fn btree_order(mut self, order: usize) -> Self {
        self.config.btree_order = order;
        self
    }

    /// Set the extensible hash bucket capacity
    pub fn hash_bucket_capacity(mut self, capacity: usize) -> Self {
        self.config.hash_bucket_capacity = capacity;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
