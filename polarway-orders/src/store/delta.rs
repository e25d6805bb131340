//! DeltaOrderStore: the `orders` table on delta-rs
//!
//! Every append is a single Delta commit, so a batch is either fully
//! visible or not at all. Filtered scans push equality predicates down to
//! DataFusion as expressions; filter values are literals in the plan and
//! never become SQL text.
//!
//! # Example
//!
//! ```rust,no_run
//! use polarway_orders::{DeltaOrderStore, OrderStore, OrdersConfig};
//!
//! #[tokio::main]
//! async fn main() -> polarway_orders::Result<()> {
//!     let store = DeltaOrderStore::new(OrdersConfig::new("/data/orders_db")).await?;
//!
//!     let rows = store.scan_all().await?;
//!     println!("{} orders, table version {}", rows.len(), store.version().await?);
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use deltalake::arrow::array::{Array, ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use deltalake::arrow::compute::cast;
use deltalake::arrow::datatypes::DataType;
use deltalake::datafusion::catalog::TableProvider;
use deltalake::datafusion::prelude::{col, lit, Expr, SessionContext};
use deltalake::protocol::SaveMode;
use deltalake::writer::{DeltaWriter, RecordBatchWriter};
use deltalake::{open_table, DeltaTable, DeltaTableError, ObjectStoreError};
use rayon::prelude::*;
use tracing::{debug, info};
use url::Url;

use super::OrderStore;
use crate::config::{OrdersConfig, DEFAULT_OUTPUT_DATE_FORMAT};
use crate::error::{OrdersError, Result};
use crate::schema::{self, FieldFilter, OrderPriority, OrderRecord, StoredOrder};

const SCAN_ALIAS: &str = "t";

/// Orders table backed by Delta Lake
///
/// Single-writer: surrogate keys are assigned from the current row count,
/// which is contiguous because the table is never updated or deleted from.
pub struct DeltaOrderStore {
    config: OrdersConfig,
}

impl DeltaOrderStore {
    /// Open the store, creating the `orders` table if it doesn't exist
    pub async fn new(config: OrdersConfig) -> Result<Self> {
        let store = Self { config };
        store.ensure_table().await?;
        info!(
            path = %store.config.table_path().display(),
            "Orders store initialized"
        );
        Ok(store)
    }

    /// Open an existing store. Fails with `TableNotFound` instead of creating;
    /// an unreadable log is a storage error.
    pub async fn open(config: OrdersConfig) -> Result<Self> {
        let store = Self { config };
        let table = open_table(store.table_url()?).await.map_err(|e| {
            if is_missing_table(&e) {
                OrdersError::TableNotFound(store.config.table_path().display().to_string())
            } else {
                OrdersError::from(e)
            }
        })?;
        debug!(table = %store.config.table_name, version = ?table.version(), "Opened orders store");
        Ok(store)
    }

    /// Convert the table path to a `Url` pointing at the table directory
    fn table_url(&self) -> Result<Url> {
        let path = std::path::absolute(self.config.table_path())?;
        Url::from_directory_path(&path).map_err(|_| {
            OrdersError::Config(format!("Invalid table path: {}", path.display()))
        })
    }

    /// Create the Delta table if it doesn't exist (idempotent)
    async fn ensure_table(&self) -> Result<()> {
        let url = self.table_url()?;
        let name = self.config.table_name.as_str();

        match open_table(url.clone()).await {
            Ok(table) => {
                debug!(table = name, version = ?table.version(), "Table already exists");
                Ok(())
            }
            Err(e) if !is_missing_table(&e) => Err(e.into()),
            Err(_) => {
                std::fs::create_dir_all(self.config.table_path())?;

                let table = DeltaTable::try_from_url(url).await?;
                let mut builder = table
                    .create()
                    .with_table_name(name)
                    .with_save_mode(SaveMode::Ignore)
                    .with_columns(schema::orders_delta_fields());

                let partition_columns = schema::orders_partition_columns();
                if !partition_columns.is_empty() {
                    builder = builder.with_partition_columns(partition_columns);
                }

                builder.await?;
                info!(table = name, "Created Delta table");
                Ok(())
            }
        }
    }

    /// DataFusion session with the current table version registered
    async fn context(&self) -> Result<SessionContext> {
        let table = open_table(self.table_url()?).await?;
        let provider: Arc<dyn TableProvider> = Arc::new(table);

        let ctx = SessionContext::new();
        ctx.register_table(SCAN_ALIAS, provider)?;
        Ok(ctx)
    }

    /// Current Delta version of the table (0 right after creation)
    pub async fn version(&self) -> Result<i64> {
        let table = open_table(self.table_url()?).await?;
        Ok(table.version().unwrap_or(0))
    }

    async fn row_count(&self) -> Result<usize> {
        let ctx = self.context().await?;
        Ok(ctx.table(SCAN_ALIAS).await?.count().await?)
    }

    async fn collect(&self, predicate: Option<Expr>) -> Result<Vec<StoredOrder>> {
        let ctx = self.context().await?;
        let mut df = ctx.table(SCAN_ALIAS).await?;
        if let Some(predicate) = predicate {
            df = df.filter(predicate)?;
        }
        let batches = df.collect().await?;
        decode_batches(&batches, DEFAULT_OUTPUT_DATE_FORMAT)
    }

    /// Encode records as one batch, assigning ids from `first_id`
    fn encode(&self, records: &[OrderRecord], first_id: i64) -> Result<RecordBatch> {
        let fmt = DEFAULT_OUTPUT_DATE_FORMAT;
        let text = |f: fn(&OrderRecord) -> &str| -> ArrayRef {
            Arc::new(StringArray::from_iter_values(records.iter().map(f)))
        };
        let long = |f: fn(&OrderRecord) -> i64| -> ArrayRef {
            Arc::new(Int64Array::from_iter_values(records.iter().map(f)))
        };
        let double = |f: fn(&OrderRecord) -> f64| -> ArrayRef {
            Arc::new(Float64Array::from_iter_values(records.iter().map(f)))
        };
        let date = |f: fn(&OrderRecord) -> NaiveDate| -> ArrayRef {
            Arc::new(StringArray::from_iter_values(
                records.iter().map(|r| f(r).format(fmt).to_string()),
            ))
        };

        let columns = vec![
            Arc::new(Int64Array::from_iter_values(
                (0..records.len() as i64).map(|i| first_id + i),
            )) as ArrayRef,
            text(|r| r.region.as_str()),
            text(|r| r.country.as_str()),
            text(|r| r.item_type.as_str()),
            text(|r| r.sales_channel.as_str()),
            text(|r| r.order_priority.as_str()),
            date(|r| r.order_date),
            long(|r| r.order_id),
            date(|r| r.ship_date),
            long(|r| r.units_sold),
            double(|r| r.unit_price),
            double(|r| r.unit_cost),
            double(|r| r.total_revenue),
            double(|r| r.total_cost),
            double(|r| r.total_profit),
            long(|r| r.order_processing_time),
            double(|r| r.gross_margin),
        ];

        Ok(RecordBatch::try_new(
            Arc::new(schema::orders_arrow_schema()),
            columns,
        )?)
    }

    /// Get a reference to the config
    pub fn config(&self) -> &OrdersConfig {
        &self.config
    }
}

#[async_trait]
impl OrderStore for DeltaOrderStore {
    /// Append records to the table (one ACID commit)
    async fn append(&self, records: &[OrderRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut table = open_table(self.table_url()?).await?;
        let first_id = self.row_count().await? as i64 + 1;
        let batch = self.encode(records, first_id)?;

        let mut writer = RecordBatchWriter::for_table(&table)?;
        writer.write(batch).await?;
        let version = writer.flush_and_commit(&mut table).await?;

        info!(
            table = %self.config.table_name,
            rows = records.len(),
            first_id,
            version,
            "Appended records"
        );
        Ok(records.len())
    }

    async fn scan_all(&self) -> Result<Vec<StoredOrder>> {
        let rows = self.collect(None).await?;
        debug!(table = %self.config.table_name, rows = rows.len(), "Scanned table");
        Ok(rows)
    }

    async fn scan_filtered(&self, filters: &[FieldFilter]) -> Result<Vec<StoredOrder>> {
        let predicate = filters
            .iter()
            .map(|f| col(f.field.store_column()).eq(lit(f.value.clone())))
            .reduce(Expr::and);
        let rows = self.collect(predicate).await?;
        debug!(
            table = %self.config.table_name,
            filters = filters.len(),
            rows = rows.len(),
            "Filtered scan"
        );
        Ok(rows)
    }
}

// ─── Batch decoding ───

/// Decode scanned batches in parallel, then restore surrogate-key order
/// No log at the location, as opposed to a log that can't be read
fn is_missing_table(err: &DeltaTableError) -> bool {
    matches!(
        err,
        DeltaTableError::NotATable(_)
            | DeltaTableError::InvalidTableLocation(_)
            | DeltaTableError::ObjectStore {
                source: ObjectStoreError::NotFound { .. }
            }
    )
}

fn decode_batches(batches: &[RecordBatch], date_format: &str) -> Result<Vec<StoredOrder>> {
    let decoded = batches
        .par_iter()
        .map(|batch| decode_batch(batch, date_format))
        .collect::<Result<Vec<_>>>()?;

    let mut rows: Vec<StoredOrder> = decoded.into_iter().flatten().collect();
    rows.sort_by_key(|row| row.id);
    Ok(rows)
}

fn typed_column(batch: &RecordBatch, name: &str, data_type: &DataType) -> Result<ArrayRef> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| OrdersError::Arrow(format!("Scanned batch has no column '{name}'")))?;
    Ok(cast(column, data_type)?)
}

fn strings(batch: &RecordBatch, name: &str) -> Result<StringArray> {
    typed_column(batch, name, &DataType::Utf8)?
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| OrdersError::Arrow(format!("Column '{name}' is not Utf8")))
}

fn longs(batch: &RecordBatch, name: &str) -> Result<Int64Array> {
    typed_column(batch, name, &DataType::Int64)?
        .as_any()
        .downcast_ref::<Int64Array>()
        .cloned()
        .ok_or_else(|| OrdersError::Arrow(format!("Column '{name}' is not Int64")))
}

fn doubles(batch: &RecordBatch, name: &str) -> Result<Float64Array> {
    typed_column(batch, name, &DataType::Float64)?
        .as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| OrdersError::Arrow(format!("Column '{name}' is not Float64")))
}

fn decode_batch(batch: &RecordBatch, date_format: &str) -> Result<Vec<StoredOrder>> {
    let id = longs(batch, schema::FIELD_ID)?;
    let region = strings(batch, schema::FIELD_REGION)?;
    let country = strings(batch, schema::FIELD_COUNTRY)?;
    let item_type = strings(batch, schema::FIELD_ITEM_TYPE)?;
    let sales_channel = strings(batch, schema::FIELD_SALES_CHANNEL)?;
    let order_priority = strings(batch, schema::FIELD_ORDER_PRIORITY)?;
    let order_date = strings(batch, schema::FIELD_ORDER_DATE)?;
    let order_id = longs(batch, schema::FIELD_ORDER_ID)?;
    let ship_date = strings(batch, schema::FIELD_SHIP_DATE)?;
    let units_sold = longs(batch, schema::FIELD_UNITS_SOLD)?;
    let unit_price = doubles(batch, schema::FIELD_UNIT_PRICE)?;
    let unit_cost = doubles(batch, schema::FIELD_UNIT_COST)?;
    let total_revenue = doubles(batch, schema::FIELD_TOTAL_REVENUE)?;
    let total_cost = doubles(batch, schema::FIELD_TOTAL_COST)?;
    let total_profit = doubles(batch, schema::FIELD_TOTAL_PROFIT)?;
    let processing = longs(batch, schema::FIELD_ORDER_PROCESSING_TIME)?;
    let margin = doubles(batch, schema::FIELD_GROSS_MARGIN)?;

    (0..batch.num_rows())
        .map(|i| -> Result<StoredOrder> {
            let row_id = id.value(i);
            let date = |array: &StringArray| {
                NaiveDate::parse_from_str(array.value(i), date_format).map_err(|e| {
                    OrdersError::CorruptRow {
                        id: row_id,
                        reason: format!("bad date '{}': {e}", array.value(i)),
                    }
                })
            };

            Ok(StoredOrder {
                id: row_id,
                record: OrderRecord {
                    region: region.value(i).to_string(),
                    country: country.value(i).to_string(),
                    item_type: item_type.value(i).to_string(),
                    sales_channel: sales_channel.value(i).to_string(),
                    order_priority: OrderPriority::from_label(order_priority.value(i)),
                    order_date: date(&order_date)?,
                    order_id: order_id.value(i),
                    ship_date: date(&ship_date)?,
                    units_sold: units_sold.value(i),
                    unit_price: unit_price.value(i),
                    unit_cost: unit_cost.value(i),
                    total_revenue: total_revenue.value(i),
                    total_cost: total_cost.value(i),
                    total_profit: total_profit.value(i),
                    order_processing_time: processing.value(i),
                    gross_margin: margin.value(i),
                },
            })
        })
        .collect()
}
