//! Tests for BPlusTree
//!
//! These tests verify:
//! - Inserted keys are all searchable, in any insertion order
//! - In-order traversal yields strictly ascending keys
//! - No leaf ever holds more than `order - 1` keys
//! - Duplicate inserts are rejected without changing the tree
//! - Delete removes exactly one key and leaves the rest reachable

use cellardb::btree::BPlusTree;
use cellardb::CellarError;

// =============================================================================
// Helper Functions
// =============================================================================

/// Deterministic permutation of `0..n` (7919 is coprime to every n used here)
fn shuffled(n: u32) -> Vec<u32> {
    (0..n).map(|i| (i * 7919) % n).collect()
}

fn assert_well_formed(tree: &BPlusTree) {
    let all = tree.get_all();
    assert_eq!(all.len(), tree.len());
    for pair in all.windows(2) {
        assert!(pair[0].0 < pair[1].0, "keys out of order: {:?}", pair);
    }
    for size in tree.leaf_sizes() {
        assert!(size < tree.order(), "leaf holds {} keys at order {}", size, tree.order());
    }
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_new_tree_is_empty() {
    let tree = BPlusTree::new(8);

    assert!(tree.is_empty());
    assert_eq!(tree.len(), 0);
    assert_eq!(tree.height(), 1);
    assert_eq!(tree.search(0), None);
    assert!(tree.get_all().is_empty());
}

#[test]
fn test_order_below_minimum_is_raised() {
    let tree = BPlusTree::new(2);

    assert_eq!(tree.order(), 4);
}

// =============================================================================
// Insert / Search Tests
// =============================================================================

#[test]
fn test_insert_and_search_single() {
    let mut tree = BPlusTree::new(4);
    tree.insert(42, 1000).unwrap();

    assert_eq!(tree.search(42), Some(1000));
    assert_eq!(tree.search(41), None);
    assert_eq!(tree.len(), 1);
}

#[test]
fn test_ascending_inserts_split_and_stay_searchable() {
    let mut tree = BPlusTree::new(4);
    for key in 0..500u32 {
        tree.insert(key, key as u64 * 10).unwrap();
    }

    for key in 0..500u32 {
        assert_eq!(tree.search(key), Some(key as u64 * 10));
    }
    assert!(tree.height() > 2);
    assert_well_formed(&tree);
}

#[test]
fn test_descending_inserts() {
    let mut tree = BPlusTree::new(5);
    for key in (0..300u32).rev() {
        tree.insert(key, key as u64).unwrap();
    }

    assert_eq!(tree.len(), 300);
    assert_well_formed(&tree);
    assert_eq!(tree.get_all().first(), Some(&(0, 0)));
    assert_eq!(tree.get_all().last(), Some(&(299, 299)));
}

#[test]
fn test_shuffled_inserts_various_orders() {
    for order in [4, 5, 7, 32] {
        let mut tree = BPlusTree::new(order);
        for key in shuffled(1000) {
            tree.insert(key, key as u64 + 12).unwrap();
        }

        assert_eq!(tree.len(), 1000);
        assert_well_formed(&tree);
        for key in 0..1000u32 {
            assert_eq!(tree.search(key), Some(key as u64 + 12), "order {}", order);
        }
    }
}

#[test]
fn test_iter_matches_get_all() {
    let mut tree = BPlusTree::new(4);
    for key in shuffled(100) {
        tree.insert(key, 0).unwrap();
    }

    let keys: Vec<u32> = tree.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, (0..100).collect::<Vec<_>>());
}

#[test]
fn test_duplicate_insert_rejected() {
    let mut tree = BPlusTree::new(4);
    for key in 0..20u32 {
        tree.insert(key, key as u64).unwrap();
    }

    let result = tree.insert(7, 999);

    assert!(matches!(result, Err(CellarError::DuplicateKey { .. })));
    assert_eq!(tree.search(7), Some(7));
    assert_eq!(tree.len(), 20);
}

#[test]
fn test_from_entries() {
    let tree = BPlusTree::from_entries(6, vec![(3, 30), (1, 10), (2, 20)]).unwrap();

    assert_eq!(tree.get_all(), vec![(1, 10), (2, 20), (3, 30)]);
}

#[test]
fn test_from_entries_rejects_duplicates() {
    let result = BPlusTree::from_entries(6, vec![(1, 10), (1, 11)]);

    assert!(result.is_err());
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_returns_offset() {
    let mut tree = BPlusTree::new(4);
    for key in 0..50u32 {
        tree.insert(key, key as u64 * 2).unwrap();
    }

    assert_eq!(tree.delete(10), Some(20));
    assert_eq!(tree.search(10), None);
    assert_eq!(tree.delete(10), None);
    assert_eq!(tree.len(), 49);
    assert_well_formed(&tree);
}

#[test]
fn test_delete_missing_key() {
    let mut tree = BPlusTree::new(4);
    tree.insert(1, 1).unwrap();

    assert_eq!(tree.delete(2), None);
    assert_eq!(tree.len(), 1);
}

#[test]
fn test_delete_everything_then_reinsert() {
    let mut tree = BPlusTree::new(4);
    for key in shuffled(200) {
        tree.insert(key, key as u64).unwrap();
    }
    for key in 0..200u32 {
        assert_eq!(tree.delete(key), Some(key as u64));
    }

    assert!(tree.is_empty());
    assert!(tree.get_all().is_empty());

    for key in shuffled(200) {
        tree.insert(key, key as u64 + 1).unwrap();
    }
    assert_eq!(tree.len(), 200);
    assert_eq!(tree.search(150), Some(151));
    assert_well_formed(&tree);
}

#[test]
fn test_delete_every_other_key() {
    let mut tree = BPlusTree::new(5);
    for key in 0..400u32 {
        tree.insert(key, key as u64).unwrap();
    }
    for key in (0..400u32).step_by(2) {
        tree.delete(key);
    }

    for key in 0..400u32 {
        let expected = if key % 2 == 1 { Some(key as u64) } else { None };
        assert_eq!(tree.search(key), expected);
    }
    assert_well_formed(&tree);
}

// =============================================================================
// Inspection Tests
// =============================================================================

#[test]
fn test_clear() {
    let mut tree = BPlusTree::new(4);
    for key in 0..100u32 {
        tree.insert(key, 0).unwrap();
    }

    tree.clear();

    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);
    tree.insert(5, 5).unwrap();
    assert_eq!(tree.search(5), Some(5));
}

#[test]
fn test_dump_mentions_every_level() {
    let mut tree = BPlusTree::new(4);
    for key in 0..30u32 {
        tree.insert(key, key as u64).unwrap();
    }

    let dump = tree.dump();

    assert!(dump.starts_with("B+ tree: order=4 keys=30"));
    assert!(dump.lines().count() > tree.height());
}
