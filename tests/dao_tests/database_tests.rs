//! Tests for Database
//!
//! These tests verify:
//! - Opening creates one data file and one index file per entity
//! - Invalid configuration is rejected before anything is created
//! - Entities are stored independently and survive reopen

use cellardb::config::{Config, SyncMode};
use cellardb::dao::{MenuItem, Order, Promotion, ReadMode};
use cellardb::{CellarError, Database};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(dir.path().join("cellar"))
        .sync_mode(SyncMode::OsBuffered)
        .btree_order(5)
        .hash_bucket_capacity(3)
        .build()
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_creates_entity_files() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(test_config(&dir)).unwrap();

    for file in [
        "menu_items.db",
        "menu_items.idx",
        "orders.db",
        "orders.idx",
        "promotions.db",
        "promotions.idx",
        "order_promotions.db",
        "order_promotions.hidx",
    ] {
        assert!(db.data_dir().join(file).exists(), "missing {}", file);
    }
    assert_eq!(db.config().btree_order, 5);
}

#[test]
fn test_open_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(dir.path().join("cellar"))
        .btree_order(3)
        .build();

    let result = Database::open(config);

    assert!(matches!(result, Err(CellarError::Config(_))));
    assert!(!dir.path().join("cellar").exists());
}

#[test]
fn test_open_rejects_zero_bucket_capacity() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(dir.path())
        .hash_bucket_capacity(0)
        .build();

    assert!(matches!(Database::open(config), Err(CellarError::Config(_))));
}

#[test]
fn test_open_path_uses_defaults() {
    let dir = TempDir::new().unwrap();

    let db = Database::open_path(dir.path()).unwrap();

    assert_eq!(db.config().btree_order, 32);
    assert_eq!(db.config().hash_bucket_capacity, 8);
    assert_eq!(db.data_dir(), dir.path());
}

// =============================================================================
// Workflow Tests
// =============================================================================

#[test]
fn test_entities_are_independent() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(test_config(&dir)).unwrap();

    let item = db.items().write(&MenuItem::new("espresso", 250)).unwrap();
    let order = db.orders().write(&Order::new("grace", vec![item], 250)).unwrap();
    let promo = db
        .promotions()
        .write(&Promotion::new("WELCOME", "first order", 10))
        .unwrap();
    db.order_promotions().write(order, promo).unwrap();

    // Each file hands out its own ids
    assert_eq!((item, order, promo), (0, 0, 0));
    assert_eq!(db.items().stats().unwrap().active_count, 1);
    assert_eq!(db.order_promotions().stats().unwrap().next_id, 0);
}

#[test]
fn test_deleting_an_order_leaves_its_links() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(test_config(&dir)).unwrap();
    let order = db.orders().write(&Order::new("linus", vec![], 0)).unwrap();
    let promo = db.promotions().write(&Promotion::new("X", "", 5)).unwrap();
    db.order_promotions().write(order, promo).unwrap();

    db.orders().delete(order).unwrap();

    assert!(db.order_promotions().exists(order, promo).unwrap());
    assert_eq!(db.order_promotions().get_by_order_id(order).unwrap().len(), 1);
}

#[test]
fn test_reopen_preserves_everything() {
    let dir = TempDir::new().unwrap();
    {
        let db = Database::open(test_config(&dir)).unwrap();
        for (name, price) in [("tea", 200), ("cake", 450), ("soup", 600)] {
            db.items().write(&MenuItem::new(name, price)).unwrap();
        }
        db.items().delete(1).unwrap();
        db.order_promotions().write(3, 4).unwrap();
    }

    let db = Database::open(test_config(&dir)).unwrap();

    let names: Vec<String> = db
        .items()
        .read_all(ReadMode::Active)
        .unwrap()
        .into_iter()
        .map(|s| s.value.name)
        .collect();
    assert_eq!(names, vec!["tea", "soup"]);
    assert_eq!(db.items().write(&MenuItem::new("pie", 300)).unwrap(), 3);
    assert!(db.order_promotions().exists(3, 4).unwrap());
}

#[test]
fn test_rebuild_all_indexes() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(test_config(&dir)).unwrap();
    for i in 0..10 {
        db.items().write(&MenuItem::new(format!("i{}", i), i)).unwrap();
    }
    db.order_promotions().write(1, 1).unwrap();
    let items_before = db.items().index_entries();

    db.rebuild_all_indexes().unwrap();

    assert_eq!(db.items().index_entries(), items_before);
    assert_eq!(db.order_promotions().index_entries().len(), 1);
    assert!(db.orders().index_entries().is_empty());
}
