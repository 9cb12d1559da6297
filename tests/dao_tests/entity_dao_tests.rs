//! Tests for EntityDao
//!
//! These tests verify:
//! - Writes return monotonically increasing ids and survive reopen
//! - Deletes are soft; deleting twice is rejected without touching counters
//! - Index lookups and sequential scans always agree
//! - A missing, corrupt, stale or lying index is recovered from
//! - Both tombstone strategies keep the index usable
//! - Concurrent writers never share an id

use std::fs;

use cellardb::btree::BPlusTree;
use cellardb::config::{Config, DeleteStrategy, SyncMode};
use cellardb::dao::{Entity, EntityDao, MenuItem, Order, ReadMode};
use cellardb::CellarError;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(dir.path())
        .sync_mode(SyncMode::OsBuffered)
        .btree_order(4)
        .build()
}

fn setup<E: Entity>() -> (TempDir, EntityDao<E>) {
    let dir = TempDir::new().unwrap();
    let dao = EntityDao::open(&test_config(&dir)).unwrap();
    (dir, dao)
}

fn write_items(dao: &EntityDao<MenuItem>, n: u32) {
    for i in 0..n {
        dao.write(&MenuItem::new(format!("item-{}", i), 100 + i)).unwrap();
    }
}

/// Entity whose deletes go through a full-file rewrite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    text: String,
}

impl Entity for Note {
    const NAME: &'static str = "note";
    const FILE_STEM: &'static str = "notes";
    const DELETE_STRATEGY: DeleteStrategy = DeleteStrategy::Rewrite;
}

// =============================================================================
// Write / Read Tests
// =============================================================================

#[test]
fn test_write_and_read_all() {
    let (_dir, dao) = setup::<MenuItem>();

    let apple = dao.write(&MenuItem::new("apple", 1500)).unwrap();
    let banana = dao.write(&MenuItem::new("banana", 800)).unwrap();

    assert_eq!((apple, banana), (0, 1));
    let all = dao.read_all(ReadMode::Active).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].value, MenuItem::new("apple", 1500));
    assert_eq!(all[1].value, MenuItem::new("banana", 800));
    assert!(all.iter().all(|s| !s.deleted));
}

#[test]
fn test_delete_hides_from_active_listing() {
    let (_dir, dao) = setup::<MenuItem>();
    let apple = dao.write(&MenuItem::new("apple", 1500)).unwrap();
    dao.write(&MenuItem::new("banana", 800)).unwrap();

    dao.delete(apple).unwrap();

    let active = dao.read_all(ReadMode::Active).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].value.name, "banana");

    let all = dao.read_all(ReadMode::All).unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].deleted);
    assert_eq!(all[0].value.name, "apple");

    let stats = dao.stats().unwrap();
    assert_eq!((stats.active_count, stats.tombstone_count), (1, 1));
}

#[test]
fn test_read_by_id() {
    let (_dir, dao) = setup::<MenuItem>();
    write_items(&dao, 20);

    let stored = dao.read_by_id(13).unwrap();

    assert_eq!(stored.id, 13);
    assert_eq!(stored.value, MenuItem::new("item-13", 113));
}

#[test]
fn test_read_by_id_distinguishes_deleted_from_missing() {
    let (_dir, dao) = setup::<MenuItem>();
    write_items(&dao, 3);
    dao.delete(1).unwrap();

    assert!(matches!(dao.read_by_id(1), Err(CellarError::Deleted { .. })));
    assert!(matches!(dao.read_by_id(3), Err(CellarError::NotFound { .. })));
    assert!(matches!(dao.read_by_id_scan(1), Err(CellarError::Deleted { .. })));
    assert!(matches!(dao.read_by_id_scan(3), Err(CellarError::NotFound { .. })));
}

#[test]
fn test_ids_keep_increasing_after_delete_and_reopen() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    {
        let dao = EntityDao::<MenuItem>::open(&config).unwrap();
        write_items(&dao, 3);
        dao.delete(2).unwrap();
    }

    let dao = EntityDao::<MenuItem>::open(&config).unwrap();
    let id = dao.write(&MenuItem::new("late", 1)).unwrap();

    assert_eq!(id, 3);
    assert_eq!(dao.read_by_id(id).unwrap().value.name, "late");
}

#[test]
fn test_order_round_trips_item_ids() {
    let (_dir, dao) = setup::<Order>();
    let order = Order::new("ada", vec![0, 4, 4, 9], 4200);

    let id = dao.write(&order).unwrap();

    assert_eq!(dao.read_by_id(id).unwrap().value, order);
}

#[test]
fn test_payload_with_framing_like_bytes() {
    let (_dir, dao) = setup::<MenuItem>();
    let tricky = MenuItem::new("a,b;c\n\"d\"\u{0}\u{1}", 0);

    let id = dao.write(&tricky).unwrap();
    dao.write(&MenuItem::new("after", 1)).unwrap();

    assert_eq!(dao.read_by_id(id).unwrap().value, tricky);
    assert_eq!(dao.read_all(ReadMode::Active).unwrap().len(), 2);
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_twice_is_already_deleted() {
    let (_dir, dao) = setup::<MenuItem>();
    write_items(&dao, 2);
    dao.delete(0).unwrap();

    let result = dao.delete(0);

    assert!(matches!(result, Err(CellarError::AlreadyDeleted { .. })));
    let stats = dao.stats().unwrap();
    assert_eq!((stats.active_count, stats.tombstone_count), (1, 1));
}

#[test]
fn test_delete_missing_id_is_not_found() {
    let (_dir, dao) = setup::<MenuItem>();
    write_items(&dao, 2);

    assert!(matches!(dao.delete(5), Err(CellarError::NotFound { .. })));
    assert_eq!(dao.stats().unwrap().tombstone_count, 0);
}

#[test]
fn test_delete_removes_index_entry() {
    let (_dir, dao) = setup::<MenuItem>();
    write_items(&dao, 5);

    dao.delete(2).unwrap();

    let keys: Vec<u32> = dao.index_entries().iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, vec![0, 1, 3, 4]);
}

#[test]
fn test_rewrite_strategy_delete() {
    let (_dir, dao) = setup::<Note>();
    for text in ["one", "two", "three"] {
        dao.write(&Note { text: text.to_string() }).unwrap();
    }
    let before = dao.index_entries();

    dao.delete(1).unwrap();

    assert!(matches!(dao.read_by_id(1), Err(CellarError::Deleted { .. })));
    assert_eq!(dao.read_by_id(2).unwrap().value.text, "three");
    // Offsets of surviving records are unchanged by the rewrite
    let after = dao.index_entries();
    assert_eq!(after, vec![before[0], before[2]]);
    assert!(matches!(dao.delete(1), Err(CellarError::AlreadyDeleted { .. })));
}

// =============================================================================
// Index / Scan Equivalence Tests
// =============================================================================

#[test]
fn test_index_and_scan_agree() {
    let (_dir, dao) = setup::<MenuItem>();
    write_items(&dao, 40);
    for id in (0..40).step_by(3) {
        dao.delete(id).unwrap();
    }

    for id in 0..45u16 {
        let indexed = dao.read_by_id(id);
        let scanned = dao.read_by_id_scan(id);
        match (indexed, scanned) {
            (Ok(a), Ok(b)) => assert_eq!(a, b),
            (Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string()),
            (a, b) => panic!("id {}: index {:?} vs scan {:?}", id, a, b),
        }
    }
}

#[test]
fn test_rebuild_index_matches_incremental_index() {
    let (_dir, dao) = setup::<MenuItem>();
    write_items(&dao, 30);
    dao.delete(4).unwrap();
    dao.delete(17).unwrap();
    let incremental = dao.index_entries();

    let count = dao.rebuild_index().unwrap();

    assert_eq!(count, 28);
    assert_eq!(dao.index_entries(), incremental);
}

#[test]
fn test_index_offsets_point_at_their_records() {
    let (_dir, dao) = setup::<MenuItem>();
    write_items(&dao, 10);

    let all = dao.read_all(ReadMode::Active).unwrap();
    let entries = dao.index_entries();

    assert_eq!(entries.len(), all.len());
    for ((key, _), stored) in entries.iter().zip(all.iter()) {
        assert_eq!(*key, stored.id as u32);
    }
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_missing_index_is_rebuilt_on_open() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let index_path = {
        let dao = EntityDao::<MenuItem>::open(&config).unwrap();
        write_items(&dao, 12);
        dao.delete(5).unwrap();
        dao.index_path().to_path_buf()
    };
    fs::remove_file(&index_path).unwrap();

    let dao = EntityDao::<MenuItem>::open(&config).unwrap();

    assert!(index_path.exists());
    assert_eq!(dao.index_entries().len(), 11);
    assert_eq!(dao.read_by_id(6).unwrap().value.name, "item-6");
    assert!(matches!(dao.read_by_id(5), Err(CellarError::Deleted { .. })));
}

#[test]
fn test_corrupt_index_is_rebuilt_on_open() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let index_path = {
        let dao = EntityDao::<MenuItem>::open(&config).unwrap();
        write_items(&dao, 8);
        dao.index_path().to_path_buf()
    };
    fs::write(&index_path, b"definitely not an index").unwrap();

    let dao = EntityDao::<MenuItem>::open(&config).unwrap();

    assert_eq!(dao.index_entries().len(), 8);
    assert!(BPlusTree::load(&index_path, 4).is_ok());
}

#[test]
fn test_stale_index_is_rebuilt_on_open() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let (index_path, old_index) = {
        let dao = EntityDao::<MenuItem>::open(&config).unwrap();
        write_items(&dao, 4);
        let old = fs::read(dao.index_path()).unwrap();
        write_items(&dao, 2);
        (dao.index_path().to_path_buf(), old)
    };
    // Put back an index that predates the last two writes
    fs::write(&index_path, &old_index).unwrap();

    let dao = EntityDao::<MenuItem>::open(&config).unwrap();

    assert_eq!(dao.index_entries().len(), 6);
    assert_eq!(dao.read_by_id(5).unwrap().value.name, "item-1");
}

#[test]
fn test_index_with_wrong_offsets_is_rebuilt_on_open() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let (index_path, entries) = {
        let dao = EntityDao::<MenuItem>::open(&config).unwrap();
        write_items(&dao, 3);
        (dao.index_path().to_path_buf(), dao.index_entries())
    };
    // Same keys and count, but id 0 points at id 1's record and id 2 at the header
    let lying = BPlusTree::from_entries(4, vec![(0, entries[1].1), (1, entries[1].1), (2, 3)])
        .unwrap();
    lying.save(&index_path).unwrap();

    let dao = EntityDao::<MenuItem>::open(&config).unwrap();

    assert_eq!(dao.index_entries(), entries);
    assert_eq!(BPlusTree::load(&index_path, 4).unwrap().get_all(), entries);
    assert_eq!(dao.read_by_id(0).unwrap().value.name, "item-0");
    assert_eq!(dao.read_by_id(2).unwrap().value.name, "item-2");
}

#[test]
fn test_index_with_same_count_but_different_ids_is_rebuilt() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let (index_path, snapshot) = {
        let dao = EntityDao::<MenuItem>::open(&config).unwrap();
        write_items(&dao, 2);
        let snapshot = fs::read(dao.index_path()).unwrap();
        dao.delete(0).unwrap();
        dao.write(&MenuItem::new("late", 9)).unwrap();
        (dao.index_path().to_path_buf(), snapshot)
    };
    // Two entries (ids 0, 1) against two live records (ids 1, 2)
    fs::write(&index_path, &snapshot).unwrap();

    let dao = EntityDao::<MenuItem>::open(&config).unwrap();

    let keys: Vec<u32> = dao.index_entries().iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, vec![1, 2]);
    assert!(matches!(dao.read_by_id(0), Err(CellarError::Deleted { .. })));
    assert_eq!(dao.read_by_id(2).unwrap().value.name, "late");
}

#[test]
fn test_empty_data_file_opens_as_new() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    fs::write(dir.path().join("menu_items.db"), b"").unwrap();

    let dao = EntityDao::<MenuItem>::open(&config).unwrap();

    assert_eq!(dao.stats().unwrap().next_id, 0);
    assert_eq!(dao.write(&MenuItem::new("apple", 1500)).unwrap(), 0);
    assert_eq!(dao.read_by_id(0).unwrap().value.price, 1500);
}

#[test]
fn test_corrupt_data_file_fails_open() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let data_path = {
        let dao = EntityDao::<MenuItem>::open(&config).unwrap();
        write_items(&dao, 2);
        dao.data_path().to_path_buf()
    };
    let bytes = fs::read(&data_path).unwrap();
    fs::write(&data_path, &bytes[..bytes.len() - 2]).unwrap();

    let result = EntityDao::<MenuItem>::open(&config);

    assert!(result.err().unwrap().is_corrupt());
}

// =============================================================================
// Maintenance Tests
// =============================================================================

#[test]
fn test_compact() {
    let (_dir, dao) = setup::<MenuItem>();
    write_items(&dao, 6);
    dao.delete(0).unwrap();
    dao.delete(3).unwrap();

    let stats = dao.compact().unwrap();

    assert_eq!((stats.records_removed, stats.records_retained), (2, 4));
    assert_eq!(dao.stats().unwrap().tombstone_count, 0);
    assert!(matches!(dao.read_by_id(0), Err(CellarError::NotFound { .. })));
    assert_eq!(dao.read_by_id(4).unwrap().value.name, "item-4");
    assert_eq!(dao.read_all(ReadMode::All).unwrap().len(), 4);
    assert_eq!(dao.write(&MenuItem::new("new", 0)).unwrap(), 6);
}

#[test]
fn test_print_index() {
    let (_dir, dao) = setup::<MenuItem>();
    write_items(&dao, 10);

    let dump = dao.print_index();

    assert!(dump.contains("order=4 keys=10"));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writes_get_unique_ids() {
    let (_dir, dao) = setup::<MenuItem>();

    let mut ids: Vec<u16> = crossbeam::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let dao = &dao;
                s.spawn(move |_| {
                    (0..25)
                        .map(|i| dao.write(&MenuItem::new(format!("t{}-{}", t, i), i)).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    })
    .unwrap();

    ids.sort_unstable();
    assert_eq!(ids, (0..100).collect::<Vec<u16>>());
    assert_eq!(dao.stats().unwrap().active_count, 100);
    assert_eq!(dao.index_entries().len(), 100);
    for id in ids {
        assert!(dao.read_by_id(id).is_ok());
    }
}

#[test]
fn test_concurrent_deletes_only_one_wins() {
    let (_dir, dao) = setup::<MenuItem>();
    write_items(&dao, 1);

    let results: Vec<bool> = crossbeam::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dao = &dao;
                s.spawn(move |_| dao.delete(0).is_ok())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
    .unwrap();

    assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(dao.stats().unwrap().tombstone_count, 1);
}
