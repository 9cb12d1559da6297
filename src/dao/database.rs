//! Database
//!
//! Opens every entity DAO under one data directory.

use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::error::{IoContext, Result};

use super::entity::{MenuItem, Order, Promotion};
use super::entity_dao::EntityDao;
use super::relation_dao::OrderPromotionDao;

/// All four DAOs of the application
///
/// Each DAO owns its files and its lock; the `Database` only groups them.
pub struct Database {
    config: Config,
    items: EntityDao<MenuItem>,
    orders: EntityDao<Order>,
    promotions: EntityDao<Promotion>,
    order_promotions: OrderPromotionDao,
}

impl Database {
    /// Open or create every entity under `config.data_dir`
    ///
    /// On startup:
    /// 1. Validate config
    /// 2. Create the data directory
    /// 3. Open each DAO (which loads or rebuilds its index)
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Validate before touching the filesystem
        config.validate()?;

        // Step 2: Data directory
        fs::create_dir_all(&config.data_dir).io_context("create data directory", &config.data_dir)?;

        // Step 3: DAOs
        let items = EntityDao::open(&config)?;
        let orders = EntityDao::open(&config)?;
        let promotions = EntityDao::open(&config)?;
        let order_promotions = OrderPromotionDao::open(&config)?;

        tracing::debug!("Opened database at {}", config.data_dir.display());

        Ok(Self {
            config,
            items,
            orders,
            promotions,
            order_promotions,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    pub fn items(&self) -> &EntityDao<MenuItem> {
        &self.items
    }

    pub fn orders(&self) -> &EntityDao<Order> {
        &self.orders
    }

    pub fn promotions(&self) -> &EntityDao<Promotion> {
        &self.promotions
    }

    pub fn order_promotions(&self) -> &OrderPromotionDao {
        &self.order_promotions
    }

    /// Rebuild every index from its data file
    pub fn rebuild_all_indexes(&self) -> Result<()> {
        self.items.rebuild_index()?;
        self.orders.rebuild_index()?;
        self.promotions.rebuild_index()?;
        self.order_promotions.rebuild_index()?;
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
