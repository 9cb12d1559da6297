//! Entity definitions
//!
//! Payloads are bincode-encoded: fixed-width little-endian integers and
//! u64-length-prefixed strings and vectors, so no payload byte is ever
//! interpreted as framing.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::DeleteStrategy;
use crate::error::Result;
use crate::store::RecordId;

/// A record type stored in its own sequenced data file
pub trait Entity: Serialize + DeserializeOwned + Clone + fmt::Debug {
    /// Human-readable name used in logs and errors
    const NAME: &'static str;

    /// File stem under the data directory (`{stem}.db`, `{stem}.idx`)
    const FILE_STEM: &'static str;

    /// How deletes flip the tombstone for this entity
    const DELETE_STRATEGY: DeleteStrategy = DeleteStrategy::InPlace;

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// An entity read back from disk together with its envelope fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored<E> {
    pub id: RecordId,
    pub deleted: bool,
    pub value: E,
}

/// Which records a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Live records only
    Active,

    /// Every record, tombstoned ones flagged via `deleted`
    All,
}

impl ReadMode {
    pub(crate) fn includes(self, deleted: bool) -> bool {
        self == ReadMode::All || !deleted
    }
}

// =============================================================================
// Menu Items
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    /// Price in minor currency units
    pub price: u32,
}

impl MenuItem {
    pub fn new(name: impl Into<String>, price: u32) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }
}

impl Entity for MenuItem {
    const NAME: &'static str = "menu item";
    const FILE_STEM: &'static str = "menu_items";
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub customer: String,
    pub item_ids: Vec<RecordId>,
    /// Total in minor currency units
    pub total: u32,
}

impl Order {
    pub fn new(customer: impl Into<String>, item_ids: Vec<RecordId>, total: u32) -> Self {
        Self {
            customer: customer.into(),
            item_ids,
            total,
        }
    }
}

impl Entity for Order {
    const NAME: &'static str = "order";
    const FILE_STEM: &'static str = "orders";
}

// =============================================================================
// Promotions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub code: String,
    pub description: String,
    pub discount_percent: u8,
}

impl Promotion {
    pub fn new(code: impl Into<String>, description: impl Into<String>, discount_percent: u8) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            discount_percent,
        }
    }
}

impl Entity for Promotion {
    const NAME: &'static str = "promotion";
    const FILE_STEM: &'static str = "promotions";
}

// =============================================================================
// Order ↔ Promotion links
// =============================================================================

/// Composite-keyed link between an order and a promotion
///
/// Both ids live in the record key; the payload is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderPromotion {
    pub order_id: RecordId,
    pub promotion_id: RecordId,
}

impl OrderPromotion {
    pub fn new(order_id: RecordId, promotion_id: RecordId) -> Self {
        Self {
            order_id,
            promotion_id,
        }
    }
}

impl fmt::Display for OrderPromotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.order_id, self.promotion_id)
    }
}

/// A link read back from disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredLink {
    pub link: OrderPromotion,
    pub deleted: bool,
}
