//! Transformer: derives processing time, gross margin and normalized
//! priority from raw rows, dropping later rows that repeat an Order ID
//!
//! The transform is a sequential fold: the first row seen for an Order ID
//! wins, so rows must be pushed in input order.
//!
//! # Example
//!
//! ```rust
//! use polarway_orders::transform::{RawOrderRow, Transformer};
//!
//! let row = RawOrderRow {
//!     region: "Asia".into(),
//!     country: "Japan".into(),
//!     item_type: "Snacks".into(),
//!     sales_channel: "Online".into(),
//!     order_priority: "H".into(),
//!     order_date: "1/1/2020".into(),
//!     order_id: "100".into(),
//!     ship_date: "1/5/2020".into(),
//!     units_sold: "10".into(),
//!     unit_price: "2.5".into(),
//!     unit_cost: "1.5".into(),
//!     total_revenue: "25".into(),
//!     total_cost: "15".into(),
//!     total_profit: "10".into(),
//! };
//!
//! let records = Transformer::default().transform([row.clone(), row])?;
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].order_processing_time, 4);
//! # Ok::<(), polarway_orders::OrdersError>(())
//! ```

use std::borrow::Borrow;
use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{OrdersConfig, DEFAULT_DATE_FORMAT};
use crate::error::{OrdersError, Result};
use crate::schema::{self, OrderPriority, OrderRecord};

/// One source row, every field still text
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOrderRow {
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "Item Type")]
    pub item_type: String,
    #[serde(rename = "Sales Channel")]
    pub sales_channel: String,
    #[serde(rename = "Order Priority")]
    pub order_priority: String,
    #[serde(rename = "Order Date")]
    pub order_date: String,
    #[serde(rename = "Order ID")]
    pub order_id: String,
    #[serde(rename = "Ship Date")]
    pub ship_date: String,
    #[serde(rename = "Units Sold")]
    pub units_sold: String,
    #[serde(rename = "Unit Price")]
    pub unit_price: String,
    #[serde(rename = "Unit Cost")]
    pub unit_cost: String,
    #[serde(rename = "Total Revenue")]
    pub total_revenue: String,
    #[serde(rename = "Total Cost")]
    pub total_cost: String,
    #[serde(rename = "Total Profit")]
    pub total_profit: String,
}

/// Stateless transformer; create a [`TransformSession`] per batch
#[derive(Debug, Clone)]
pub struct Transformer {
    date_format: String,
}

impl Default for Transformer {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

impl Transformer {
    pub fn new(config: &OrdersConfig) -> Self {
        Self {
            date_format: config.date_format.clone(),
        }
    }

    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    /// Start a fresh dedup scope
    pub fn session(&self) -> TransformSession<'_> {
        TransformSession {
            transformer: self,
            seen: HashSet::new(),
            position: 0,
            emitted: 0,
        }
    }

    /// Transform a whole batch. Any malformed row aborts the batch.
    pub fn transform<I>(&self, rows: I) -> Result<Vec<OrderRecord>>
    where
        I: IntoIterator,
        I::Item: Borrow<RawOrderRow>,
    {
        let mut session = self.session();
        let mut out = Vec::new();
        for row in rows {
            if let Some(record) = session.push(row.borrow())? {
                out.push(record);
            }
        }
        debug!(
            rows_in = session.rows_read(),
            rows_out = out.len(),
            duplicates = session.duplicates(),
            "Transformed batch"
        );
        Ok(out)
    }

    fn enrich(&self, row_no: usize, order_id: i64, raw: &RawOrderRow) -> Result<OrderRecord> {
        let order_date = parse_date(row_no, schema::COL_ORDER_DATE, &raw.order_date, &self.date_format)?;
        let ship_date = parse_date(row_no, schema::COL_SHIP_DATE, &raw.ship_date, &self.date_format)?;

        let units_sold = parse_int(row_no, schema::COL_UNITS_SOLD, &raw.units_sold)?;
        if units_sold < 0 {
            return Err(OrdersError::malformed(row_no, schema::COL_UNITS_SOLD, "must be non-negative"));
        }
        let unit_price = parse_non_negative(row_no, schema::COL_UNIT_PRICE, &raw.unit_price)?;
        let unit_cost = parse_non_negative(row_no, schema::COL_UNIT_COST, &raw.unit_cost)?;
        let total_revenue = parse_decimal(row_no, schema::COL_TOTAL_REVENUE, &raw.total_revenue)?;
        let total_cost = parse_decimal(row_no, schema::COL_TOTAL_COST, &raw.total_cost)?;
        let total_profit = parse_decimal(row_no, schema::COL_TOTAL_PROFIT, &raw.total_profit)?;

        Ok(OrderRecord {
            region: raw.region.clone(),
            country: raw.country.clone(),
            item_type: raw.item_type.clone(),
            sales_channel: raw.sales_channel.clone(),
            order_priority: OrderPriority::from_code(&raw.order_priority),
            order_date,
            order_id,
            ship_date,
            units_sold,
            unit_price,
            unit_cost,
            total_revenue,
            total_cost,
            total_profit,
            order_processing_time: schema::processing_days(order_date, ship_date),
            gross_margin: schema::gross_margin(total_profit, total_revenue),
        })
    }
}

/// Dedup state for one transform invocation
pub struct TransformSession<'a> {
    transformer: &'a Transformer,
    seen: HashSet<i64>,
    position: usize,
    emitted: usize,
}

impl TransformSession<'_> {
    /// Feed the next row. `Ok(None)` means the row repeated an earlier Order ID.
    pub fn push(&mut self, raw: &RawOrderRow) -> Result<Option<OrderRecord>> {
        self.position += 1;
        let row_no = self.position;

        let order_id = parse_int(row_no, schema::COL_ORDER_ID, &raw.order_id)?;
        if !self.seen.insert(order_id) {
            return Ok(None);
        }

        let record = self.transformer.enrich(row_no, order_id, raw)?;
        self.emitted += 1;
        Ok(Some(record))
    }

    pub fn rows_read(&self) -> usize {
        self.position
    }

    pub fn rows_emitted(&self) -> usize {
        self.emitted
    }

    pub fn duplicates(&self) -> usize {
        self.position - self.emitted
    }
}

// ─── Field coercion ───

pub(crate) fn parse_int(row: usize, field: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|e| OrdersError::malformed(row, field, format!("'{value}' is not an integer ({e})")))
}

pub(crate) fn parse_decimal(row: usize, field: &str, value: &str) -> Result<f64> {
    let parsed = value
        .trim()
        .parse::<f64>()
        .map_err(|e| OrdersError::malformed(row, field, format!("'{value}' is not a number ({e})")))?;
    if !parsed.is_finite() {
        return Err(OrdersError::malformed(row, field, format!("'{value}' is not finite")));
    }
    Ok(parsed)
}

fn parse_non_negative(row: usize, field: &str, value: &str) -> Result<f64> {
    let parsed = parse_decimal(row, field, value)?;
    if parsed < 0.0 {
        return Err(OrdersError::malformed(row, field, "must be non-negative"));
    }
    Ok(parsed)
}

pub(crate) fn parse_date(row: usize, field: &str, value: &str, format: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), format).map_err(|e| {
        OrdersError::malformed(row, field, format!("'{value}' does not match '{format}' ({e})"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn raw(order_id: &str, region: &str, units: &str) -> RawOrderRow {
        RawOrderRow {
            region: region.to_string(),
            country: "Japan".to_string(),
            item_type: "Snacks".to_string(),
            sales_channel: "Online".to_string(),
            order_priority: "H".to_string(),
            order_date: "1/1/2020".to_string(),
            order_id: order_id.to_string(),
            ship_date: "1/5/2020".to_string(),
            units_sold: units.to_string(),
            unit_price: "2.0".to_string(),
            unit_cost: "1.0".to_string(),
            total_revenue: "200.0".to_string(),
            total_cost: "100.0".to_string(),
            total_profit: "100.0".to_string(),
        }
    }

    #[test]
    fn test_processing_time_and_margin() {
        let out = Transformer::default().transform([raw("1", "Asia", "100")]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].order_processing_time, 4);
        assert!((out[0].gross_margin - 0.5).abs() < 1e-12);
        assert_eq!(out[0].order_priority, OrderPriority::High);
    }

    #[test]
    fn test_zero_revenue_margin_is_zero() {
        let mut row = raw("1", "Asia", "0");
        row.total_revenue = "0".to_string();
        row.total_profit = "-5.0".to_string();
        let out = Transformer::default().transform([row]).unwrap();
        assert_eq!(out[0].gross_margin, 0.0);
    }

    #[test]
    fn test_priority_normalization() {
        let rows: Vec<_> = ["H", "C", "L", "M", "X"]
            .iter()
            .enumerate()
            .map(|(i, code)| {
                let mut r = raw(&i.to_string(), "Asia", "1");
                r.order_priority = code.to_string();
                r
            })
            .collect();
        let labels: Vec<_> = Transformer::default()
            .transform(&rows)
            .unwrap()
            .into_iter()
            .map(|r| r.order_priority.as_str())
            .collect();
        assert_eq!(labels, vec!["High", "Critical", "Low", "Medium", "Unknown"]);
    }

    #[test]
    fn test_first_seen_wins() {
        let rows = vec![raw("100", "Asia", "10"), raw("7", "Europe", "3"), raw("100", "Africa", "99")];
        let out = Transformer::default().transform(&rows).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].order_id, 100);
        assert_eq!(out[0].units_sold, 10);
        assert_eq!(out[0].region, "Asia");
        assert_eq!(out[1].order_id, 7);
    }

    #[test]
    fn test_dedup_idempotence() {
        let once = vec![raw("1", "Asia", "1"), raw("2", "Asia", "2"), raw("3", "Europe", "3")];
        let twice: Vec<_> = once.iter().chain(once.iter()).cloned().collect();
        let t = Transformer::default();
        assert_eq!(t.transform(&once).unwrap(), t.transform(&twice).unwrap());
    }

    #[test]
    fn test_order_id_compared_as_integer() {
        let rows = vec![raw("100", "Asia", "1"), raw(" 0100", "Asia", "2")];
        let out = Transformer::default().transform(&rows).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_bad_date_aborts_batch() {
        let mut bad = raw("2", "Asia", "1");
        bad.ship_date = "2020-01-05".to_string();
        let err = Transformer::default()
            .transform([raw("1", "Asia", "1"), bad])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        match err {
            OrdersError::MalformedField { row, field, .. } => {
                assert_eq!(row, 2);
                assert_eq!(field, "Ship Date");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_with_bad_fields_is_skipped() {
        let mut dup = raw("1", "Asia", "not-a-number");
        dup.order_date = "garbage".to_string();
        let out = Transformer::default().transform([raw("1", "Asia", "1"), dup]).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_non_numeric_units_rejected() {
        let err = Transformer::default()
            .transform([raw("1", "Asia", "ten")])
            .unwrap_err();
        assert!(err.to_string().contains("Units Sold"));
    }

    #[test]
    fn test_negative_units_rejected() {
        let err = Transformer::default()
            .transform([raw("1", "Asia", "-4")])
            .unwrap_err();
        assert!(matches!(err, OrdersError::MalformedField { ref field, .. } if field == "Units Sold"));
    }

    #[test]
    fn test_custom_date_format() {
        let cfg = OrdersConfig::new("/tmp/x").with_date_format("%Y-%m-%d");
        let mut row = raw("1", "Asia", "1");
        row.order_date = "2021-03-01".to_string();
        row.ship_date = "2021-02-27".to_string();
        let out = Transformer::new(&cfg).transform([row]).unwrap();
        assert_eq!(out[0].order_processing_time, -2);
    }

    #[test]
    fn test_session_counters() {
        let t = Transformer::default();
        let mut session = t.session();
        assert!(session.push(&raw("1", "Asia", "1")).unwrap().is_some());
        assert!(session.push(&raw("1", "Asia", "1")).unwrap().is_none());
        assert_eq!(session.rows_read(), 2);
        assert_eq!(session.rows_emitted(), 1);
        assert_eq!(session.duplicates(), 1);
    }
}
