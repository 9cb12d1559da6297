//! Store Module
//!
//! Binary record store: one file per entity, append-biased, soft deletes.
//!
//! ## Responsibilities
//! - Create data files with a zeroed header on first use
//! - Append length-prefixed records and assign ids from the header
//! - Full sequential scans (listings and index rebuilds)
//! - Tombstone flips, either in place or by rewriting via `<path>.tmp`
//! - Physical compaction of tombstoned records
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (12 bytes sequenced, 8 bytes composite)               │
//! │   ActiveCount: u32 | TombstoneCount: u32 | [NextId: u32]     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Record (variable)                                            │
//! │   [RecordLen: u16][Key][Tombstone: u8][Payload]              │
//! │   Key = Id: u16                 (sequenced)                  │
//! │       | OrderId: u16 PromoId: u16 (composite)                │
//! │   RecordLen counts every byte after the length prefix        │
//! │   ... repeated for each record ...                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. There are no separator bytes anywhere:
//! every variable-length region is found through a length prefix.

pub(crate) mod atomic;
mod file;
mod header;
mod record;

pub use file::{CompactionStats, RecordFile, ScannedRecord};
pub use header::{FileHeader, FileLayout};
pub use record::{Record, RecordId, RecordKey};

// =============================================================================
// Shared Constants (used by header, record, file)
// =============================================================================

/// Size of the per-record length prefix
pub(crate) const LEN_PREFIX_SIZE: usize = 2;

/// Size of the tombstone flag
pub(crate) const TOMBSTONE_SIZE: usize = 1;

/// Tombstone byte of a live record
pub(crate) const TOMBSTONE_LIVE: u8 = 0;

/// Tombstone byte of a deleted record
pub(crate) const TOMBSTONE_DELETED: u8 = 1;

/// Largest value the u16 length prefix can describe
pub(crate) const MAX_RECORD_BODY: usize = u16::MAX as usize;
