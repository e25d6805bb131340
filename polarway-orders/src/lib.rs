//! # Polarway Orders
//!
//! Order ingestion for Polarway: cleans raw sales CSV exports, persists the
//! enriched rows to an append-only Delta Lake table and answers
//! filter/group-by summary queries over it.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │             polarway-orders               │
//! ├───────────────┬───────────────────────────┤
//! │  Transformer  │        QueryEngine        │
//! │  (dedup,      │  (allow-listed filters,   │
//! │   enrich)     │   group-by, aggregates)   │
//! ├───────────────┴───────────────────────────┤
//! │        OrderStore (append-only)           │
//! │   DeltaOrderStore  │  MemoryOrderStore    │
//! ├───────────────────────────────────────────┤
//! │          Delta Lake (delta-rs)            │
//! └───────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use polarway_orders::{
//!     csv_io, DeltaOrderStore, OrderQuery, OrderStore, OrdersConfig, QueryEngine, Transformer,
//! };
//!
//! #[tokio::main]
//! async fn main() -> polarway_orders::Result<()> {
//!     let config = OrdersConfig::new("/data/orders_db");
//!     let transformer = Transformer::new(&config);
//!
//!     let raw = std::fs::File::open("/data/raw/orders.csv")?;
//!     let records = transformer.transform(csv_io::read_raw_rows(raw)?)?;
//!
//!     let store = Arc::new(DeltaOrderStore::new(config).await?);
//!     store.append(&records).await?;
//!
//!     let outcome = QueryEngine::new(store)
//!         .run(&OrderQuery::new().filter("Region", "Asia").group_by("Item Type"))
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&outcome.aggregations)?);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **First occurrence wins**: duplicate Order IDs are dropped during transformation
//! - **Atomic batches**: every append is a single Delta commit
//! - **Injection-safe queries**: field names are allow-listed, values are bound literals
//! - **Railway Programming**: All operations return `Result<T, OrdersError>`

pub mod config;
pub mod csv_io;
pub mod error;
pub mod query;
pub mod schema;
pub mod store;
pub mod transform;

// Re-exports for convenience
pub use config::OrdersConfig;
pub use csv_io::TransformSummary;
pub use error::{ErrorKind, OrdersError, Result};
pub use query::{Aggregates, Aggregations, OrderQuery, QueryEngine, QueryOutcome, QueryPlan};
pub use schema::{FieldFilter, OrderField, OrderPriority, OrderRecord, StoredOrder};
pub use store::{DeltaOrderStore, MemoryOrderStore, OrderStore};
pub use transform::{RawOrderRow, Transformer};
