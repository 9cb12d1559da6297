//! B+ Tree Index Module
//!
//! Ordered in-memory index from a record id to the byte offset of that
//! record in its data file.
//!
//! ## Responsibilities
//! - O(log n) insert, search and delete
//! - Ordered traversal through the leaf chain
//! - Crash-safe persistence as a flat sorted dump
//!
//! ## Node Storage
//! Nodes live in an arena (`Vec<Node>`) and refer to each other by index.
//! Splits and leaf-chain updates only rewrite indices. Deleting never merges
//! or frees nodes: an index is small and can always be rebuilt from the
//! data file, so underflowed leaves are simply left in place.
//!
//! ## File Format
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │ Magic: "CLBT" (4) | Version: u8 | Order: u32 | Count: u32 │
//! ├───────────────────────────────────────────────────────────┤
//! │ [Key: u32][Offset: i64]  ... Count entries, ascending ... │
//! ├───────────────────────────────────────────────────────────┤
//! │ CRC32 of everything above: u32                            │
//! └───────────────────────────────────────────────────────────┘
//! ```
//! Only the pairs are stored. Loading re-inserts them in ascending order.

mod node;
mod persist;
mod tree;

pub use tree::{BPlusTree, Iter};

// =============================================================================
// Shared Constants (used by tree, persist)
// =============================================================================

/// Magic bytes identifying a B+ tree index file
pub(crate) const MAGIC: &[u8; 4] = b"CLBT";

/// Current index file format version
pub(crate) const VERSION: u8 = 1;

/// Magic (4) + Version (1) + Order (4) + Count (4)
pub(crate) const HEADER_SIZE: usize = 13;

/// Key (4) + Offset (8)
pub(crate) const ENTRY_SIZE: usize = 12;

/// Trailing CRC32
pub(crate) const CHECKSUM_SIZE: usize = 4;
