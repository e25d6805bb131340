//! CSV boundary: reading source files, writing transformed files and
//! reading transformed files back for loading
//!
//! Columns are located by header name, so column order is free and extra
//! columns are carried through the transform untouched.

use std::collections::HashMap;
use std::io::{Read, Write};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::info;

use crate::error::{OrdersError, Result};
use crate::schema::{self, OrderPriority, OrderRecord, DERIVED_COLUMNS, SOURCE_COLUMNS};
use crate::transform::{parse_date, parse_decimal, parse_int, RawOrderRow, Transformer};

/// Counters reported by [`transform_csv`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransformSummary {
    pub rows_read: usize,
    pub rows_written: usize,
    pub duplicates: usize,
}

/// Header name → position, resolved once per file
struct ColumnIndex {
    positions: HashMap<&'static str, usize>,
}

impl ColumnIndex {
    fn locate(headers: &StringRecord, required: &[&'static str]) -> Result<Self> {
        let mut positions = HashMap::with_capacity(required.len());
        for column in required {
            let pos = headers
                .iter()
                .position(|h| h.trim() == *column)
                .ok_or_else(|| OrdersError::MissingColumn(column.to_string()))?;
            positions.insert(*column, pos);
        }
        Ok(Self { positions })
    }

    fn position(&self, column: &str) -> usize {
        self.positions[column]
    }

    fn get<'r>(&self, record: &'r StringRecord, column: &str) -> &'r str {
        record.get(self.position(column)).unwrap_or("")
    }

    fn raw_row(&self, record: &StringRecord) -> RawOrderRow {
        let field = |c: &str| self.get(record, c).to_string();
        RawOrderRow {
            region: field(schema::COL_REGION),
            country: field(schema::COL_COUNTRY),
            item_type: field(schema::COL_ITEM_TYPE),
            sales_channel: field(schema::COL_SALES_CHANNEL),
            order_priority: field(schema::COL_ORDER_PRIORITY),
            order_date: field(schema::COL_ORDER_DATE),
            order_id: field(schema::COL_ORDER_ID),
            ship_date: field(schema::COL_SHIP_DATE),
            units_sold: field(schema::COL_UNITS_SOLD),
            unit_price: field(schema::COL_UNIT_PRICE),
            unit_cost: field(schema::COL_UNIT_COST),
            total_revenue: field(schema::COL_TOTAL_REVENUE),
            total_cost: field(schema::COL_TOTAL_COST),
            total_profit: field(schema::COL_TOTAL_PROFIT),
        }
    }
}

fn csv_reader<R: Read>(input: R) -> csv::Reader<R> {
    ReaderBuilder::new().has_headers(true).from_reader(input)
}

/// Read a source file into raw rows (no coercion yet)
pub fn read_raw_rows<R: Read>(input: R) -> Result<Vec<RawOrderRow>> {
    let mut reader = csv_reader(input);
    let index = ColumnIndex::locate(reader.headers()?, &SOURCE_COLUMNS)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(index.raw_row(&record?));
    }
    Ok(rows)
}

/// Transform a source file into a transformed file
///
/// Output keeps the source header (and any extra columns) in place, rewrites
/// `Order Priority` to its label and appends `Order Processing Time` and
/// `Gross Margin`. Nothing is flushed to `output` unless the whole input
/// transforms cleanly.
pub fn transform_csv<R: Read, W: Write>(
    transformer: &Transformer,
    input: R,
    output: W,
) -> Result<TransformSummary> {
    let mut reader = csv_reader(input);
    let headers = reader.headers()?.clone();
    let index = ColumnIndex::locate(&headers, &SOURCE_COLUMNS)?;
    let priority_pos = index.position(schema::COL_ORDER_PRIORITY);

    let mut session = transformer.session();
    let mut out_rows: Vec<StringRecord> = Vec::new();

    for record in reader.records() {
        let record = record?;
        let Some(enriched) = session.push(&index.raw_row(&record))? else {
            continue;
        };

        let mut row = StringRecord::with_capacity(record.as_slice().len() + 32, record.len() + 2);
        for (pos, value) in record.iter().enumerate() {
            if pos == priority_pos {
                row.push_field(enriched.order_priority.as_str());
            } else {
                row.push_field(value);
            }
        }
        row.push_field(&enriched.order_processing_time.to_string());
        row.push_field(&enriched.gross_margin.to_string());
        out_rows.push(row);
    }

    let mut writer = WriterBuilder::new().from_writer(output);
    let mut out_headers = headers.clone();
    for column in DERIVED_COLUMNS {
        out_headers.push_field(column);
    }
    writer.write_record(&out_headers)?;
    for row in &out_rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    let summary = TransformSummary {
        rows_read: session.rows_read(),
        rows_written: out_rows.len(),
        duplicates: session.duplicates(),
    };
    info!(
        rows_read = summary.rows_read,
        rows_written = summary.rows_written,
        duplicates = summary.duplicates,
        "Transformed CSV"
    );
    Ok(summary)
}

/// Read a transformed file (source columns plus derived columns) into records
///
/// Used by the load stage; derived values are taken from the file as written.
pub fn read_transformed_rows<R: Read>(input: R, date_format: &str) -> Result<Vec<OrderRecord>> {
    let mut reader = csv_reader(input);
    let required: Vec<&'static str> = SOURCE_COLUMNS.iter().chain(DERIVED_COLUMNS.iter()).copied().collect();
    let index = ColumnIndex::locate(reader.headers()?, &required)?;

    let mut records = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let text = |c: &str| index.get(&record, c).to_string();
        let int = |c: &str| parse_int(row, c, index.get(&record, c));
        let decimal = |c: &str| parse_decimal(row, c, index.get(&record, c));
        let date = |c: &str| parse_date(row, c, index.get(&record, c), date_format);

        records.push(OrderRecord {
            region: text(schema::COL_REGION),
            country: text(schema::COL_COUNTRY),
            item_type: text(schema::COL_ITEM_TYPE),
            sales_channel: text(schema::COL_SALES_CHANNEL),
            order_priority: OrderPriority::from_label(index.get(&record, schema::COL_ORDER_PRIORITY)),
            order_date: date(schema::COL_ORDER_DATE)?,
            order_id: int(schema::COL_ORDER_ID)?,
            ship_date: date(schema::COL_SHIP_DATE)?,
            units_sold: int(schema::COL_UNITS_SOLD)?,
            unit_price: decimal(schema::COL_UNIT_PRICE)?,
            unit_cost: decimal(schema::COL_UNIT_COST)?,
            total_revenue: decimal(schema::COL_TOTAL_REVENUE)?,
            total_cost: decimal(schema::COL_TOTAL_COST)?,
            total_profit: decimal(schema::COL_TOTAL_PROFIT)?,
            order_processing_time: int(schema::COL_ORDER_PROCESSING_TIME)?,
            gross_margin: decimal(schema::COL_GROSS_MARGIN)?,
        });
    }
    Ok(records)
}
