//! CellarDB Admin Binary
//!
//! Inspection and maintenance commands for a CellarDB data directory.

use clap::{Parser, Subcommand, ValueEnum};
use cellardb::dao::{Entity, EntityDao, ReadMode};
use cellardb::store::FileHeader;
use cellardb::{Config, Database};
use tracing_subscriber::{fmt, EnvFilter};

/// CellarDB Admin
#[derive(Parser, Debug)]
#[command(name = "cellar-admin")]
#[command(about = "Inspect and maintain a CellarDB data directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./cellar_data")]
    data_dir: String,

    /// B+ tree order used when (re)building indexes
    #[arg(long, default_value = "32")]
    btree_order: usize,

    /// Extensible hash bucket capacity
    #[arg(long, default_value = "8")]
    bucket_capacity: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show header counters of every entity
    Stats,

    /// List records of an entity
    List {
        entity: EntityKind,

        /// Include tombstoned records
        #[arg(long)]
        all: bool,
    },

    /// Print an entity's index structure
    PrintIndex { entity: EntityKind },

    /// Rebuild an entity's index from its data file
    RebuildIndex { entity: EntityKind },

    /// Drop tombstoned records from an entity's data file
    Compact { entity: EntityKind },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EntityKind {
    Items,
    Orders,
    Promotions,
    OrderPromotions,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cellardb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    tracing::debug!("CellarDB Admin v{}", cellardb::VERSION);
    tracing::debug!("Data directory: {}", args.data_dir);

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .btree_order(args.btree_order)
        .hash_bucket_capacity(args.bucket_capacity)
        .build();

    let db = match Database::open(config) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&db, args.command) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(db: &Database, command: Commands) -> cellardb::Result<()> {
    match command {
        Commands::Stats => {
            print_stats("items", db.items().stats()?);
            print_stats("orders", db.orders().stats()?);
            print_stats("promotions", db.promotions().stats()?);
            print_stats("order_promotions", db.order_promotions().stats()?);
        }
        Commands::List { entity, all } => {
            let mode = if all { ReadMode::All } else { ReadMode::Active };
            match entity {
                EntityKind::Items => list(db.items(), mode)?,
                EntityKind::Orders => list(db.orders(), mode)?,
                EntityKind::Promotions => list(db.promotions(), mode)?,
                EntityKind::OrderPromotions => {
                    for stored in db.order_promotions().read_all(mode)? {
                        println!("{}{}", stored.link, deleted_marker(stored.deleted));
                    }
                }
            }
        }
        Commands::PrintIndex { entity } => {
            let dump = match entity {
                EntityKind::Items => db.items().print_index(),
                EntityKind::Orders => db.orders().print_index(),
                EntityKind::Promotions => db.promotions().print_index(),
                EntityKind::OrderPromotions => db.order_promotions().print_index(),
            };
            print!("{}", dump);
        }
        Commands::RebuildIndex { entity } => {
            let count = match entity {
                EntityKind::Items => db.items().rebuild_index()?,
                EntityKind::Orders => db.orders().rebuild_index()?,
                EntityKind::Promotions => db.promotions().rebuild_index()?,
                EntityKind::OrderPromotions => db.order_promotions().rebuild_index()?,
            };
            println!("indexed {} records", count);
        }
        Commands::Compact { entity } => {
            let stats = match entity {
                EntityKind::Items => db.items().compact()?,
                EntityKind::Orders => db.orders().compact()?,
                EntityKind::Promotions => db.promotions().compact()?,
                EntityKind::OrderPromotions => db.order_promotions().compact()?,
            };
            println!(
                "removed {} tombstoned records, retained {}",
                stats.records_removed, stats.records_retained
            );
        }
    }
    Ok(())
}

fn list<E: Entity>(dao: &EntityDao<E>, mode: ReadMode) -> cellardb::Result<()> {
    for stored in dao.read_all(mode)? {
        println!("{:>5} {:?}{}", stored.id, stored.value, deleted_marker(stored.deleted));
    }
    Ok(())
}

fn print_stats(name: &str, header: FileHeader) {
    println!(
        "{:<17} active={:<6} tombstones={:<6} next_id={}",
        name, header.active_count, header.tombstone_count, header.next_id
    );
}

fn deleted_marker(deleted: bool) -> &'static str {
    if deleted {
        " (deleted)"
    } else {
        ""
    }
}
