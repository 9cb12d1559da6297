//! # CellarDB
//!
//! An embedded storage engine with one file per entity:
//! - Length-prefixed binary records with tombstone (soft) deletes
//! - B+ tree index for point lookups by record id
//! - Extensible hash index for composite-key relationship tables
//! - Automatic index rebuild from the data file when an index is missing,
//!   corrupt or stale
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Database                             │
//! │     items │ orders │ promotions │ order_promotions          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      DAO layer                              │
//! │        (one Mutex per entity, scan fallback, rebuild)       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────────┐
//!          │            │                 │
//!          ▼            ▼                 ▼
//!   ┌─────────────┐ ┌─────────────┐ ┌─────────────┐
//!   │   B+ tree   │ │ Ext. hash   │ │ Record store│
//!   │  (id→off)   │ │((a,b)→off)  │ │  (.db file) │
//!   └─────────────┘ └─────────────┘ └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod store;
pub mod btree;
pub mod hash;
pub mod dao;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CellarError, Result};
pub use config::Config;
pub use dao::Database;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of CellarDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
