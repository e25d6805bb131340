//! Append-only persistence of enriched order records
//!
//! Two backends implement [`OrderStore`]:
//! - [`DeltaOrderStore`]: Delta Lake table on local disk, one commit per append
//! - [`MemoryOrderStore`]: in-process vector, for tests and embedding
//!
//! Neither exposes update or delete.

use async_trait::async_trait;

use crate::error::Result;
use crate::schema::{FieldFilter, OrderRecord, StoredOrder};

pub mod delta;
pub mod memory;

pub use delta::DeltaOrderStore;
pub use memory::MemoryOrderStore;

/// Storage contract consumed by the loader and the query engine
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Append a batch. Either every record is written or none are.
    /// Returns the number of records inserted.
    async fn append(&self, records: &[OrderRecord]) -> Result<usize>;

    /// Every stored row, ordered by surrogate key
    async fn scan_all(&self) -> Result<Vec<StoredOrder>>;

    /// Rows matching every filter (logical AND), ordered by surrogate key
    async fn scan_filtered(&self, filters: &[FieldFilter]) -> Result<Vec<StoredOrder>> {
        let rows = self.scan_all().await?;
        Ok(rows
            .into_iter()
            .filter(|row| filters.iter().all(|f| f.matches(&row.record)))
            .collect())
    }
}
