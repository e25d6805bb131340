//! QueryEngine: allow-listed equality filters, optional group-by and
//! summary statistics over the stored orders
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use polarway_orders::{MemoryOrderStore, OrderQuery, QueryEngine};
//!
//! # #[tokio::main]
//! # async fn main() -> polarway_orders::Result<()> {
//! let engine = QueryEngine::new(Arc::new(MemoryOrderStore::new()));
//!
//! let outcome = engine
//!     .run(&OrderQuery::new().filter("Region", "Asia").group_by("Item Type"))
//!     .await?;
//! assert!(outcome.records.is_empty());
//!
//! // Unknown fields are rejected before the store is touched
//! assert!(engine.run(&OrderQuery::new().filter("Discount", "10%")).await.is_err());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::schema::StoredOrder;
use crate::store::OrderStore;

pub mod aggregate;
pub mod plan;

pub use aggregate::{aggregate, Aggregates, Aggregations, GroupAggregates};
pub use plan::{OrderQuery, QueryPlan};

/// Matching rows plus their aggregates, both from the same filtered view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub records: Vec<StoredOrder>,
    pub aggregations: Aggregations,
}

/// Runs validated queries against an [`OrderStore`]
pub struct QueryEngine<S: OrderStore + ?Sized> {
    store: Arc<S>,
}

impl<S: OrderStore + ?Sized> QueryEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Validate, scan once, aggregate
    pub async fn run(&self, query: &OrderQuery) -> Result<QueryOutcome> {
        let plan = QueryPlan::build(query)?;
        debug!(
            filters = plan.filters().len(),
            group_by = ?plan.group_by(),
            "Query plan built"
        );
        self.execute(&plan).await
    }

    /// Execute an already validated plan
    pub async fn execute(&self, plan: &QueryPlan) -> Result<QueryOutcome> {
        let records = if plan.filters().is_empty() {
            self.store.scan_all().await?
        } else {
            self.store.scan_filtered(plan.filters()).await?
        };
        let aggregations = aggregate(&records, plan.group_by())?;

        info!(
            matched = records.len(),
            grouped = plan.is_grouped(),
            "Query executed"
        );
        Ok(QueryOutcome {
            records,
            aggregations,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::{OrderPriority, OrderRecord};
    use crate::store::MemoryOrderStore;

    fn record(order_id: i64, region: &str, units: i64) -> OrderRecord {
        OrderRecord {
            region: region.to_string(),
            country: "Country".to_string(),
            item_type: "Snacks".to_string(),
            sales_channel: "Online".to_string(),
            order_priority: OrderPriority::High,
            order_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            order_id,
            ship_date: NaiveDate::from_ymd_opt(2020, 1, 3).unwrap(),
            units_sold: units,
            unit_price: 2.0,
            unit_cost: 1.0,
            total_revenue: 2.0 * units as f64,
            total_cost: units as f64,
            total_profit: units as f64,
            order_processing_time: 2,
            gross_margin: 0.5,
        }
    }

    async fn engine_with(records: &[OrderRecord]) -> QueryEngine<MemoryOrderStore> {
        let store = Arc::new(MemoryOrderStore::new());
        store.append(records).await.unwrap();
        QueryEngine::new(store)
    }

    #[tokio::test]
    async fn test_no_filter_identity() {
        let engine = engine_with(&[record(1, "Asia", 3), record(2, "Europe", 5)]).await;
        let outcome = engine.run(&OrderQuery::new()).await.unwrap();
        assert_eq!(outcome.records.len(), 2);
        let Aggregations::Overall(stats) = outcome.aggregations else {
            panic!("expected overall aggregates");
        };
        assert_eq!(stats.total_units_sold, Some(8));
        assert_eq!(stats.number_of_orders, Some(2));
    }

    #[tokio::test]
    async fn test_filter_and_group() {
        let engine = engine_with(&[
            record(1, "Asia", 3),
            record(2, "Europe", 5),
            record(3, "Asia", 7),
        ])
        .await;
        let outcome = engine
            .run(&OrderQuery::new().filter("Region", "Asia").group_by("Region"))
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 2);
        let groups = outcome.aggregations.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1.total_units_sold, Some(10));
    }

    #[tokio::test]
    async fn test_injection_value_matches_nothing() {
        let engine = engine_with(&[record(1, "Asia", 3)]).await;
        let outcome = engine
            .run(&OrderQuery::new().filter("Region", "A' OR '1'='1"))
            .await
            .unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.aggregations, Aggregations::Overall(Aggregates::default()));
    }

    #[tokio::test]
    async fn test_unknown_field_is_invalid_request() {
        let engine = engine_with(&[]).await;
        let err = engine
            .run(&OrderQuery::new().filter("Discount", "10%"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("Discount"));
    }

    #[tokio::test]
    async fn test_empty_store_is_not_an_error() {
        let engine = engine_with(&[]).await;
        let outcome = engine.run(&OrderQuery::new().group_by("Country")).await.unwrap();
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.aggregations, Aggregations::Grouped(vec![]));
    }
}
