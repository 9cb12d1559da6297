//! Order ↔ promotion relationship DAO
//!
//! Composite-keyed data file backed by an extensible hash index. There is
//! no primary key; the `(order_id, promotion_id)` pair must be unique among
//! live records.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{CellarError, Result};
use crate::hash::{ExtensibleHashIndex, HashEntry};
use crate::store::{
    CompactionStats, FileHeader, FileLayout, RecordFile, RecordId, RecordKey, ScannedRecord,
};

use super::entity::{OrderPromotion, ReadMode, StoredLink};

const ENTITY: &str = "order promotion";
const FILE_STEM: &str = "order_promotions";

/// Index plus whether a miss in it can be trusted
struct LinkIndex {
    index: ExtensibleHashIndex,

    /// False when the index could neither be loaded nor rebuilt; every
    /// lookup then goes to the data file.
    trusted: bool,
}

/// Data access object for order ↔ promotion links
///
/// Deletes rewrite the data file through `<path>.tmp`. Deleting an order or
/// a promotion never cascades here; callers decide using
/// [`get_by_order_id`](Self::get_by_order_id) and
/// [`get_by_promotion_id`](Self::get_by_promotion_id).
pub struct OrderPromotionDao {
    store: RecordFile,
    index_path: PathBuf,
    state: Mutex<LinkIndex>,
    bucket_capacity: usize,
}

impl OrderPromotionDao {
    pub fn open(config: &Config) -> Result<Self> {
        let data_path = config.data_dir.join(format!("{}.db", FILE_STEM));
        let index_path = config.data_dir.join(format!("{}.hidx", FILE_STEM));
        Self::open_at(data_path, index_path, config)
    }

    pub fn open_at(
        data_path: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
        config: &Config,
    ) -> Result<Self> {
        let store = RecordFile::new(ENTITY, data_path, FileLayout::Composite, config.sync_mode);
        let index_path = index_path.into();

        store.ensure_initialized()?;
        let (_, records) = store.recover()?;
        let state = load_or_rebuild(&records, &index_path, config.hash_bucket_capacity);

        Ok(Self {
            store,
            index_path,
            state: Mutex::new(state),
            bucket_capacity: config.hash_bucket_capacity,
        })
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Link an order to a promotion
    ///
    /// Fails with `DuplicateKey` if the live link already exists.
    pub fn write(&self, order_id: RecordId, promotion_id: RecordId) -> Result<()> {
        let mut state = self.state.lock();

        if self.exists_locked(&state, order_id, promotion_id)? {
            return Err(CellarError::duplicate(
                ENTITY,
                OrderPromotion::new(order_id, promotion_id),
            ));
        }

        let offset = self.store.append_pair(order_id, promotion_id, &[])?;
        if let Err(e) = state
            .index
            .insert(order_id as u64, promotion_id as u64, offset)
        {
            tracing::warn!(
                "{} ({}, {}): index insert failed: {}",
                ENTITY,
                order_id,
                promotion_id,
                e
            );
            state.trusted = false;
        }
        self.persist(&state.index);

        tracing::debug!(
            "Linked order {} to promotion {} at offset {}",
            order_id,
            promotion_id,
            offset
        );
        Ok(())
    }

    /// Soft-delete a link by rewriting the data file
    pub fn delete(&self, order_id: RecordId, promotion_id: RecordId) -> Result<()> {
        let mut state = self.state.lock();

        let removed = state.index.delete(order_id as u64, promotion_id as u64);
        if let Err(e) = self
            .store
            .rewrite_tombstone(RecordKey::Pair(order_id, promotion_id))
        {
            if let Some(offset) = removed {
                let _ = state
                    .index
                    .insert(order_id as u64, promotion_id as u64, offset);
            }
            return Err(e);
        }

        self.persist(&state.index);
        tracing::debug!("Unlinked order {} from promotion {}", order_id, promotion_id);
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Whether a live link exists, using the index
    pub fn exists(&self, order_id: RecordId, promotion_id: RecordId) -> Result<bool> {
        let state = self.state.lock();
        self.exists_locked(&state, order_id, promotion_id)
    }

    /// Whether a live link exists, using a full scan only
    pub fn exists_by_scan(&self, order_id: RecordId, promotion_id: RecordId) -> Result<bool> {
        Ok(self.scan_live(order_id, promotion_id)?.is_some())
    }

    /// Fetch one link
    ///
    /// `Deleted` when only tombstoned copies exist, `NotFound` when the pair
    /// was never written.
    pub fn read(&self, order_id: RecordId, promotion_id: RecordId) -> Result<OrderPromotion> {
        let state = self.state.lock();
        let key = RecordKey::Pair(order_id, promotion_id);

        if let Some(offset) = state.index.search(order_id as u64, promotion_id as u64) {
            match self.store.read_at(offset) {
                Ok(record) if record.key == key && !record.tombstone => {
                    return Ok(OrderPromotion::new(order_id, promotion_id));
                }
                Ok(record) => tracing::warn!(
                    "{} {}: index offset {} holds {} (tombstone={}); falling back to scan",
                    ENTITY,
                    key,
                    offset,
                    record.key,
                    record.tombstone
                ),
                Err(e) => tracing::warn!(
                    "{} {}: index offset {} unreadable ({}); falling back to scan",
                    ENTITY,
                    key,
                    offset,
                    e
                ),
            }
        }
        drop(state);

        let records = self.store.read_all()?;
        let mut seen_deleted = false;
        for r in records.iter().filter(|r| r.record.key == key) {
            if !r.record.tombstone {
                return Ok(OrderPromotion::new(order_id, promotion_id));
            }
            seen_deleted = true;
        }
        if seen_deleted {
            Err(CellarError::deleted(ENTITY, key))
        } else {
            Err(CellarError::not_found(ENTITY, key))
        }
    }

    /// Live links of one order, sorted by promotion id
    pub fn get_by_order_id(&self, order_id: RecordId) -> Result<Vec<OrderPromotion>> {
        let state = self.state.lock();
        let mut links = if state.trusted {
            to_links(state.index.get_by_first_key(order_id as u64))
        } else {
            self.scan_links(|link| link.order_id == order_id)?
        };
        links.sort();
        Ok(links)
    }

    /// Live links of one promotion, sorted by order id
    pub fn get_by_promotion_id(&self, promotion_id: RecordId) -> Result<Vec<OrderPromotion>> {
        let state = self.state.lock();
        let mut links = if state.trusted {
            to_links(state.index.get_by_second_key(promotion_id as u64))
        } else {
            self.scan_links(|link| link.promotion_id == promotion_id)?
        };
        links.sort_by_key(|link| (link.promotion_id, link.order_id));
        Ok(links)
    }

    /// Every link in file order
    pub fn read_all(&self, mode: ReadMode) -> Result<Vec<StoredLink>> {
        Ok(self
            .store
            .read_all()?
            .into_iter()
            .filter(|r| mode.includes(r.record.tombstone))
            .filter_map(|r| to_stored_link(&r))
            .collect())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Discard the in-memory index and rebuild it from a full scan
    pub fn rebuild_index(&self) -> Result<usize> {
        let mut state = self.state.lock();
        state.index = scan_index(&self.store, self.bucket_capacity)?;
        state.trusted = true;
        state.index.save(&self.index_path)?;
        tracing::info!("Rebuilt {} index: {} entries", ENTITY, state.index.len());
        Ok(state.index.len())
    }

    /// Physically drop tombstoned links, then rebuild the index
    pub fn compact(&self) -> Result<CompactionStats> {
        let mut state = self.state.lock();
        let stats = self.store.compact()?;
        state.index = scan_index(&self.store, self.bucket_capacity)?;
        state.trusted = true;
        state.index.save(&self.index_path)?;
        Ok(stats)
    }

    pub fn print_index(&self) -> String {
        self.state.lock().index.dump()
    }

    pub fn stats(&self) -> Result<FileHeader> {
        self.store.header()
    }

    /// Index contents, one entry per physical bucket slot
    pub fn index_entries(&self) -> Vec<HashEntry> {
        self.state.lock().index.get_all()
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

    fn exists_locked(
        &self,
        state: &LinkIndex,
        order_id: RecordId,
        promotion_id: RecordId,
    ) -> Result<bool> {
        if !state.trusted {
            return self.exists_by_scan(order_id, promotion_id);
        }
        Ok(state
            .index
            .search(order_id as u64, promotion_id as u64)
            .is_some())
    }

    fn scan_live(
        &self,
        order_id: RecordId,
        promotion_id: RecordId,
    ) -> Result<Option<ScannedRecord>> {
        let key = RecordKey::Pair(order_id, promotion_id);
        Ok(self
            .store
            .read_all()?
            .into_iter()
            .find(|r| r.record.key == key && !r.record.tombstone))
    }

    fn scan_links(&self, keep: impl Fn(&OrderPromotion) -> bool) -> Result<Vec<OrderPromotion>> {
        Ok(self
            .store
            .read_all()?
            .iter()
            .filter(|r| !r.record.tombstone)
            .filter_map(to_stored_link)
            .map(|s| s.link)
            .filter(|link| keep(link))
            .collect())
    }

    fn persist(&self, index: &ExtensibleHashIndex) {
        if let Err(e) = index.save(&self.index_path) {
            tracing::warn!(
                "{} index save failed ({}); index file stale until rebuilt",
                ENTITY,
                e
            );
        }
    }
}

fn to_stored_link(r: &ScannedRecord) -> Option<StoredLink> {
    match r.record.key {
        RecordKey::Pair(order_id, promotion_id) => Some(StoredLink {
            link: OrderPromotion::new(order_id, promotion_id),
            deleted: r.record.tombstone,
        }),
        RecordKey::Id(_) => None,
    }
}

fn to_links(entries: Vec<HashEntry>) -> Vec<OrderPromotion> {
    entries
        .into_iter()
        .map(|e| OrderPromotion::new(e.first as RecordId, e.second as RecordId))
        .collect()
}

/// Every live link as an index entry, sorted by key
fn live_entries(records: &[ScannedRecord]) -> Vec<HashEntry> {
    let mut entries: Vec<HashEntry> = records
        .iter()
        .filter(|r| !r.record.tombstone)
        .filter_map(|r| match r.record.key {
            RecordKey::Pair(a, b) => Some(HashEntry {
                first: a as u64,
                second: b as u64,
                offset: r.offset,
            }),
            RecordKey::Id(_) => None,
        })
        .collect();
    sort_entries(&mut entries);
    entries
}

fn sort_entries(entries: &mut [HashEntry]) {
    entries.sort_unstable_by_key(|e| (e.first, e.second, e.offset));
}

fn scan_index(store: &RecordFile, bucket_capacity: usize) -> Result<ExtensibleHashIndex> {
    ExtensibleHashIndex::from_entries(bucket_capacity, live_entries(&store.read_all()?))
}

/// Whether a loaded index maps exactly the live links
fn matches_live(index: &ExtensibleHashIndex, live: &[HashEntry]) -> bool {
    if index.len() != live.len() {
        return false;
    }
    let mut indexed = index.get_all();
    sort_entries(&mut indexed);
    indexed == live
}

fn load_or_rebuild(
    records: &[ScannedRecord],
    index_path: &Path,
    bucket_capacity: usize,
) -> LinkIndex {
    let live = live_entries(records);

    match ExtensibleHashIndex::load(index_path) {
        Ok(index) if index.bucket_capacity() == bucket_capacity && matches_live(&index, &live) => {
            tracing::debug!("Loaded {} index: {} entries", ENTITY, index.len());
            return LinkIndex {
                index,
                trusted: true,
            };
        }
        Ok(index) => tracing::warn!(
            "{} index (capacity {}, {} entries) does not match config/data (capacity {}, {} live); rebuilding",
            ENTITY,
            index.bucket_capacity(),
            index.len(),
            bucket_capacity,
            live.len()
        ),
        Err(CellarError::Io { ref source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No {} index at {}; building from data", ENTITY, index_path.display())
        }
        Err(e) => tracing::warn!("{} index unusable ({}); rebuilding from data", ENTITY, e),
    }

    match ExtensibleHashIndex::from_entries(bucket_capacity, live) {
        Ok(index) => {
            if let Err(e) = index.save(index_path) {
                tracing::warn!("{} rebuilt index could not be saved: {}", ENTITY, e);
            }
            LinkIndex {
                index,
                trusted: true,
            }
        }
        Err(e) => {
            tracing::warn!(
                "{} index rebuild failed ({}); lookups degrade to sequential scan",
                ENTITY,
                e
            );
            LinkIndex {
                index: ExtensibleHashIndex::new(bucket_capacity),
                trusted: false,
            }
        }
    }
}
