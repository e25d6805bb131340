//! In-memory order store

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::OrderStore;
use crate::error::Result;
use crate::schema::{OrderRecord, StoredOrder};

/// Vector-backed store. Appends happen under one write lock, so a batch is
/// never partially visible.
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    rows: RwLock<Vec<StoredOrder>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn append(&self, records: &[OrderRecord]) -> Result<usize> {
        let mut rows = self.rows.write();
        let first_id = rows.len() as i64 + 1;
        rows.extend(records.iter().cloned().enumerate().map(|(i, record)| StoredOrder {
            id: first_id + i as i64,
            record,
        }));
        debug!(rows = records.len(), total = rows.len(), "Appended records in memory");
        Ok(records.len())
    }

    async fn scan_all(&self) -> Result<Vec<StoredOrder>> {
        Ok(self.rows.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::schema::{FieldFilter, OrderField, OrderPriority};

    fn record(order_id: i64, region: &str) -> OrderRecord {
        OrderRecord {
            region: region.to_string(),
            country: "Japan".to_string(),
            item_type: "Snacks".to_string(),
            sales_channel: "Online".to_string(),
            order_priority: OrderPriority::Low,
            order_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            order_id,
            ship_date: NaiveDate::from_ymd_opt(2020, 1, 2).unwrap(),
            units_sold: 1,
            unit_price: 1.0,
            unit_cost: 0.5,
            total_revenue: 1.0,
            total_cost: 0.5,
            total_profit: 0.5,
            order_processing_time: 1,
            gross_margin: 0.5,
        }
    }

    #[tokio::test]
    async fn test_ids_continue_across_appends() {
        let store = MemoryOrderStore::new();
        assert_eq!(store.append(&[record(1, "Asia"), record(2, "Europe")]).await.unwrap(), 2);
        assert_eq!(store.append(&[record(3, "Asia")]).await.unwrap(), 1);

        let ids: Vec<_> = store.scan_all().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_append_is_noop() {
        let store = MemoryOrderStore::new();
        assert_eq!(store.append(&[]).await.unwrap(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_scan_filtered_uses_and() {
        let store = MemoryOrderStore::new();
        store
            .append(&[record(1, "Asia"), record(2, "Europe"), record(3, "Asia")])
            .await
            .unwrap();

        let asia = store
            .scan_filtered(&[FieldFilter::new(OrderField::Region, "Asia")])
            .await
            .unwrap();
        assert_eq!(asia.len(), 2);

        let none = store
            .scan_filtered(&[
                FieldFilter::new(OrderField::Region, "Asia"),
                FieldFilter::new(OrderField::OrderPriority, "High"),
            ])
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
