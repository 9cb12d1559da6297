//! Entity DAO
//!
//! Ties one sequenced data file to its B+ tree index.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::btree::BPlusTree;
use crate::config::{Config, DeleteStrategy};
use crate::error::{CellarError, Result};
use crate::store::{
    CompactionStats, FileHeader, FileLayout, Record, RecordFile, RecordId, RecordKey,
    ScannedRecord,
};

use super::entity::{Entity, ReadMode, Stored};

/// Data access object for one entity type
///
/// ## Concurrency
/// - `index`: one Mutex guards every operation that reads or writes the
///   index, including the index save, for its full duration
/// - `read_all` scans the data file without taking the lock
///
/// ## Index/data consistency
/// The in-memory index is authoritative only for hits. A miss, or a hit
/// whose offset does not parse to the expected record, falls back to a
/// sequential scan. A failed index save after a durable append is logged
/// and the on-disk index stays stale until the next successful save or
/// rebuild.
pub struct EntityDao<E: Entity> {
    store: RecordFile,
    index_path: PathBuf,
    index: Mutex<BPlusTree>,
    order: usize,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityDao<E> {
    /// Open the entity's files under `config.data_dir`
    pub fn open(config: &Config) -> Result<Self> {
        let data_path = config.data_dir.join(format!("{}.db", E::FILE_STEM));
        let index_path = config.data_dir.join(format!("{}.idx", E::FILE_STEM));
        Self::open_at(data_path, index_path, config)
    }

    /// Open with explicit file paths
    ///
    /// On startup:
    /// 1. Create the data file if missing
    /// 2. Repair header counters left behind by a crash
    /// 3. Load the index, or rebuild it from that scan if it is missing,
    ///    corrupt or does not match the live records
    pub fn open_at(
        data_path: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
        config: &Config,
    ) -> Result<Self> {
        let store = RecordFile::new(E::NAME, data_path, FileLayout::Sequenced, config.sync_mode);
        let index_path = index_path.into();

        // Step 1: Data file
        store.ensure_initialized()?;

        // Step 2: Header consistency (the scan also validates the index)
        let (_, records) = store.recover()?;

        // Step 3: Index
        let index = load_or_rebuild(E::NAME, &records, &index_path, config.btree_order);

        Ok(Self {
            store,
            index_path,
            index: Mutex::new(index),
            order: config.btree_order,
            _entity: PhantomData,
        })
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Append a new record and index it; returns the assigned id
    pub fn write(&self, value: &E) -> Result<RecordId> {
        let payload = value.encode()?;
        let mut index = self.index.lock();

        let (id, offset) = self.store.append(&payload)?;

        // The record is durable from here on; index trouble only degrades
        // lookups to a scan.
        if let Err(e) = index.insert(id as u32, offset) {
            tracing::warn!("{} {}: index insert failed: {}", E::NAME, id, e);
        }
        self.persist(&index);

        tracing::debug!("Wrote {} {} at offset {}", E::NAME, id, offset);
        Ok(id)
    }

    /// Soft-delete a record
    ///
    /// The index entry is removed before the tombstone is written and
    /// restored if the write fails.
    pub fn delete(&self, id: RecordId) -> Result<()> {
        let mut index = self.index.lock();

        let located = self.locate(&index, id)?;
        if located.record.tombstone {
            return Err(CellarError::already_deleted(E::NAME, id));
        }

        let removed = index.delete(id as u32);
        let written = match E::DELETE_STRATEGY {
            DeleteStrategy::InPlace => self.store.mark_tombstone(located.offset, RecordKey::Id(id)),
            DeleteStrategy::Rewrite => self.store.rewrite_tombstone(RecordKey::Id(id)).map(|_| ()),
        };
        if let Err(e) = written {
            if let Some(offset) = removed {
                let _ = index.insert(id as u32, offset);
            }
            return Err(e);
        }

        self.persist(&index);
        tracing::debug!("Deleted {} {}", E::NAME, id);
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch one record by id
    ///
    /// Returns `Deleted` for a tombstoned record and `NotFound` when the id
    /// was never written.
    pub fn read_by_id(&self, id: RecordId) -> Result<Stored<E>> {
        let index = self.index.lock();
        let located = self.locate(&index, id)?;
        drop(index);

        if located.record.tombstone {
            return Err(CellarError::deleted(E::NAME, id));
        }
        decode_stored(located.record)
    }

    /// Fetch one record by id with a sequential scan, ignoring the index
    pub fn read_by_id_scan(&self, id: RecordId) -> Result<Stored<E>> {
        let located = self.scan_for(id)?;
        if located.record.tombstone {
            return Err(CellarError::deleted(E::NAME, id));
        }
        decode_stored(located.record)
    }

    /// Every record in file order
    ///
    /// Scans without the lock, so a concurrent write may or may not be
    /// visible.
    pub fn read_all(&self, mode: ReadMode) -> Result<Vec<Stored<E>>> {
        self.store
            .read_all()?
            .into_iter()
            .filter(|r| mode.includes(r.record.tombstone))
            .map(|r| decode_stored(r.record))
            .collect()
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Discard the in-memory index and rebuild it from a full scan
    ///
    /// Returns the number of indexed records.
    pub fn rebuild_index(&self) -> Result<usize> {
        let mut index = self.index.lock();
        *index = scan_index(&self.store, self.order)?;
        index.save(&self.index_path)?;
        tracing::info!("Rebuilt {} index: {} entries", E::NAME, index.len());
        Ok(index.len())
    }

    /// Physically drop tombstoned records, then rebuild the index
    pub fn compact(&self) -> Result<CompactionStats> {
        let mut index = self.index.lock();
        let stats = self.store.compact()?;
        *index = scan_index(&self.store, self.order)?;
        index.save(&self.index_path)?;
        Ok(stats)
    }

    /// Human-readable index dump
    pub fn print_index(&self) -> String {
        self.index.lock().dump()
    }

    /// Current header counters
    pub fn stats(&self) -> Result<FileHeader> {
        self.store.header()
    }

    /// Index contents in key order
    pub fn index_entries(&self) -> Vec<(u32, u64)> {
        self.index.lock().get_all()
    }

    pub fn data_path(&self) -> &Path {
        self.store.path()
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Find a record through the index, falling back to a scan
    fn locate(&self, index: &BPlusTree, id: RecordId) -> Result<ScannedRecord> {
        if let Some(offset) = index.search(id as u32) {
            match self.store.read_at(offset) {
                Ok(record) if record.key == RecordKey::Id(id) => {
                    return Ok(ScannedRecord { offset, record });
                }
                Ok(record) => tracing::warn!(
                    "{} {}: index offset {} holds record {}; falling back to scan",
                    E::NAME,
                    id,
                    offset,
                    record.key
                ),
                Err(e) => tracing::warn!(
                    "{} {}: index offset {} unreadable ({}); falling back to scan",
                    E::NAME,
                    id,
                    offset,
                    e
                ),
            }
        }
        self.scan_for(id)
    }

    fn scan_for(&self, id: RecordId) -> Result<ScannedRecord> {
        self.store
            .read_all()?
            .into_iter()
            .find(|r| r.record.key == RecordKey::Id(id))
            .ok_or_else(|| CellarError::not_found(E::NAME, id))
    }

    fn persist(&self, index: &BPlusTree) {
        if let Err(e) = index.save(&self.index_path) {
            tracing::warn!(
                "{} index save failed ({}); index file stale until rebuilt",
                E::NAME,
                e
            );
        }
    }
}

fn decode_stored<E: Entity>(record: Record) -> Result<Stored<E>> {
    let id = match record.key {
        RecordKey::Id(id) => id,
        RecordKey::Pair(..) => {
            return Err(CellarError::Serialization(format!(
                "{} record carries composite key {}",
                E::NAME,
                record.key
            )))
        }
    };
    Ok(Stored {
        id,
        deleted: record.tombstone,
        value: E::decode(&record.payload)?,
    })
}

/// `(id, offset)` of every live record, in id order
fn live_entries(records: &[ScannedRecord]) -> Vec<(u32, u64)> {
    let mut entries: Vec<(u32, u64)> = records
        .iter()
        .filter(|r| !r.record.tombstone)
        .filter_map(|r| match r.record.key {
            RecordKey::Id(id) => Some((id as u32, r.offset)),
            RecordKey::Pair(..) => None,
        })
        .collect();
    entries.sort_unstable();
    entries
}

/// Build a fresh index from every live record in the data file
fn scan_index(store: &RecordFile, order: usize) -> Result<BPlusTree> {
    BPlusTree::from_entries(order, live_entries(&store.read_all()?))
}

/// Startup recovery: load the saved index if it maps exactly the live
/// records, else rebuild from the scan, else run with an empty index and
/// rely on scan fallback
fn load_or_rebuild(
    entity: &str,
    records: &[ScannedRecord],
    index_path: &Path,
    order: usize,
) -> BPlusTree {
    let live = live_entries(records);

    match BPlusTree::load(index_path, order) {
        Ok(tree) if tree.get_all() == live => {
            tracing::debug!("Loaded {} index: {} entries", entity, tree.len());
            return tree;
        }
        Ok(tree) => tracing::warn!(
            "{} index ({} entries) does not match the {} live records; rebuilding",
            entity,
            tree.len(),
            live.len()
        ),
        Err(CellarError::Io { ref source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {} index at {}; building from data", entity, index_path.display())
        }
        Err(e) => tracing::warn!("{} index unusable ({}); rebuilding from data", entity, e),
    }

    match BPlusTree::from_entries(order, live) {
        Ok(tree) => {
            if let Err(e) = tree.save(index_path) {
                tracing::warn!("{} rebuilt index could not be saved: {}", entity, e);
            }
            tree
        }
        Err(e) => {
            tracing::warn!(
                "{} index rebuild failed ({}); lookups degrade to sequential scan",
                entity,
                e
            );
            BPlusTree::new(order)
        }
    }
}
