//! DAO Module
//!
//! Per-entity coordinators over the record store and the indexes.
//!
//! ## Responsibilities
//! - Sequence header read → record append → index update → index save
//! - Fall back to a sequential scan when the index misses or is stale
//! - Rebuild indexes on load failure or on request
//! - Serialize every index-touching operation behind one lock per DAO
//!
//! ## Delete Ordering
//! The index entry is removed first, then the tombstone is written, then
//! the index is saved. A reader racing a delete through the index can at
//! worst miss and fall back to a scan.

mod database;
mod entity;
mod entity_dao;
mod relation_dao;

pub use database::Database;
pub use entity::{Entity, MenuItem, Order, OrderPromotion, Promotion, ReadMode, Stored, StoredLink};
pub use entity_dao::EntityDao;
pub use relation_dao::OrderPromotionDao;
