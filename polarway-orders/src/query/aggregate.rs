//! Single-pass grouped aggregation over matching orders

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{OrdersError, Result};
use crate::schema::{OrderField, OrderRecord, StoredOrder};

/// Summary statistics for one group. Every statistic is `None` when the
/// group has no rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    #[serde(rename = "Average Order Processing Time in days")]
    pub avg_order_processing_time: Option<f64>,
    #[serde(rename = "Total Order Processing Time in days")]
    pub total_order_processing_time: Option<i64>,
    #[serde(rename = "Average Gross Margin")]
    pub avg_gross_margin: Option<f64>,
    #[serde(rename = "Average Units Sold")]
    pub avg_units_sold: Option<f64>,
    #[serde(rename = "Max Units Sold")]
    pub max_units_sold: Option<i64>,
    #[serde(rename = "Min Units Sold")]
    pub min_units_sold: Option<i64>,
    #[serde(rename = "Total Units Sold")]
    pub total_units_sold: Option<i64>,
    #[serde(rename = "Total Revenue")]
    pub total_revenue: Option<f64>,
    #[serde(rename = "Total Profit")]
    pub total_profit: Option<f64>,
    #[serde(rename = "Number of Orders")]
    pub number_of_orders: Option<u64>,
    #[serde(rename = "Row Count")]
    pub row_count: u64,
}

/// Statistics for one group-by key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAggregates {
    /// Canonical field name → value shared by the group
    #[serde(rename = "Group")]
    pub group: BTreeMap<String, String>,
    #[serde(flatten)]
    pub stats: Aggregates,
}

/// Aggregation payload: one object when ungrouped, one entry per group otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Aggregations {
    Overall(Aggregates),
    Grouped(Vec<GroupAggregates>),
}

impl Aggregations {
    /// Groups in key order; the ungrouped case is a single unnamed group
    pub fn groups(&self) -> Vec<(BTreeMap<String, String>, &Aggregates)> {
        match self {
            Self::Overall(stats) => vec![(BTreeMap::new(), stats)],
            Self::Grouped(groups) => groups.iter().map(|g| (g.group.clone(), &g.stats)).collect(),
        }
    }
}

/// Running totals for one group
#[derive(Debug, Default)]
struct Accumulator {
    rows: u64,
    processing_time_sum: i64,
    gross_margin_sum: f64,
    units_sum: i64,
    units_min: Option<i64>,
    units_max: Option<i64>,
    revenue_sum: f64,
    profit_sum: f64,
    order_ids: HashSet<i64>,
}

impl Accumulator {
    fn add(&mut self, record: &OrderRecord) -> Result<()> {
        self.processing_time_sum = checked_sum(
            self.processing_time_sum,
            record.order_processing_time,
            "Total Order Processing Time in days",
        )?;
        self.units_sum = checked_sum(self.units_sum, record.units_sold, "Total Units Sold")?;
        self.rows += 1;
        self.gross_margin_sum += record.gross_margin;
        self.units_min = Some(self.units_min.map_or(record.units_sold, |m| m.min(record.units_sold)));
        self.units_max = Some(self.units_max.map_or(record.units_sold, |m| m.max(record.units_sold)));
        self.revenue_sum += record.total_revenue;
        self.profit_sum += record.total_profit;
        self.order_ids.insert(record.order_id);
        Ok(())
    }

    fn finish(self) -> Aggregates {
        if self.rows == 0 {
            return Aggregates::default();
        }
        let n = self.rows as f64;
        Aggregates {
            avg_order_processing_time: Some(self.processing_time_sum as f64 / n),
            total_order_processing_time: Some(self.processing_time_sum),
            avg_gross_margin: Some(self.gross_margin_sum / n),
            avg_units_sold: Some(self.units_sum as f64 / n),
            max_units_sold: self.units_max,
            min_units_sold: self.units_min,
            total_units_sold: Some(self.units_sum),
            total_revenue: Some(self.revenue_sum),
            total_profit: Some(self.profit_sum),
            number_of_orders: Some(self.order_ids.len() as u64),
            row_count: self.rows,
        }
    }
}

fn checked_sum(total: i64, value: i64, statistic: &str) -> Result<i64> {
    total
        .checked_add(value)
        .ok_or_else(|| OrdersError::AggregateOverflow {
            statistic: statistic.to_string(),
        })
}

/// Aggregate `rows` in one pass, grouped by `group_by` (in that order)
///
/// With no group-by the whole set is one group, reported even when empty.
/// With a group-by only keys that occur are reported, in sorted key order.
/// Integer totals that leave the `i64` range fail with `AggregateOverflow`.
pub fn aggregate(rows: &[StoredOrder], group_by: &[OrderField]) -> Result<Aggregations> {
    if group_by.is_empty() {
        let mut acc = Accumulator::default();
        for row in rows {
            acc.add(&row.record)?;
        }
        return Ok(Aggregations::Overall(acc.finish()));
    }

    let mut groups: BTreeMap<Vec<String>, Accumulator> = BTreeMap::new();
    for row in rows {
        let key: Vec<String> = group_by
            .iter()
            .map(|f| f.value_of(&row.record).to_string())
            .collect();
        groups.entry(key).or_default().add(&row.record)?;
    }

    Ok(Aggregations::Grouped(
        groups
            .into_iter()
            .map(|(key, acc)| GroupAggregates {
                group: group_by
                    .iter()
                    .map(|f| f.canonical_name().to_string())
                    .zip(key)
                    .collect(),
                stats: acc.finish(),
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::OrderPriority;

    fn row(id: i64, order_id: i64, region: &str, item: &str, units: i64, revenue: f64, profit: f64) -> StoredOrder {
        StoredOrder {
            id,
            record: OrderRecord {
                region: region.to_string(),
                country: "Country".to_string(),
                item_type: item.to_string(),
                sales_channel: "Online".to_string(),
                order_priority: OrderPriority::Medium,
                order_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                order_id,
                ship_date: NaiveDate::from_ymd_opt(2020, 1, 1 + units as u32 % 20).unwrap(),
                units_sold: units,
                unit_price: 1.0,
                unit_cost: 1.0,
                total_revenue: revenue,
                total_cost: revenue - profit,
                total_profit: profit,
                order_processing_time: units % 20,
                gross_margin: if revenue == 0.0 { 0.0 } else { profit / revenue },
            },
        }
    }

    fn sample() -> Vec<StoredOrder> {
        vec![
            row(1, 100, "Asia", "Snacks", 10, 100.0, 25.0),
            row(2, 101, "Asia", "Fruits", 4, 40.0, 10.0),
            row(3, 102, "Europe", "Snacks", 7, 70.0, 7.0),
            row(4, 102, "Europe", "Snacks", 1, 10.0, 0.0),
        ]
    }

    #[test]
    fn test_overall_statistics() {
        let Aggregations::Overall(stats) = aggregate(&sample(), &[]).unwrap() else {
            panic!("expected overall aggregates");
        };
        assert_eq!(stats.row_count, 4);
        assert_eq!(stats.total_units_sold, Some(22));
        assert_eq!(stats.max_units_sold, Some(10));
        assert_eq!(stats.min_units_sold, Some(1));
        assert_eq!(stats.avg_units_sold, Some(5.5));
        assert_eq!(stats.total_revenue, Some(220.0));
        assert_eq!(stats.total_profit, Some(42.0));
        // Order 102 appears twice
        assert_eq!(stats.number_of_orders, Some(3));
        assert_eq!(stats.total_order_processing_time, Some(22));
    }

    #[test]
    fn test_average_times_count_matches_total() {
        let rows = sample();
        for (_, stats) in aggregate(&rows, &[OrderField::Region]).unwrap().groups() {
            let avg = stats.avg_units_sold.unwrap();
            let total = stats.total_units_sold.unwrap() as f64;
            assert!((avg * stats.row_count as f64 - total).abs() < 1e-9);
        }
    }

    #[test]
    fn test_grouped_by_region_and_item() {
        let grouped = aggregate(&sample(), &[OrderField::Region, OrderField::ItemType]).unwrap();
        let Aggregations::Grouped(groups) = grouped else {
            panic!("expected grouped aggregates");
        };
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].group["Region"], "Asia");
        assert_eq!(groups[0].group["ItemType"], "Fruits");
        assert_eq!(groups[2].group["Region"], "Europe");
        assert_eq!(groups[2].stats.row_count, 2);
        assert_eq!(groups[2].stats.number_of_orders, Some(1));
    }

    #[test]
    fn test_empty_overall_is_null() {
        let Aggregations::Overall(stats) = aggregate(&[], &[]).unwrap() else {
            panic!("expected overall aggregates");
        };
        assert_eq!(stats, Aggregates::default());
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json["Average Units Sold"].is_null());
        assert!(json["Number of Orders"].is_null());
        assert_eq!(json["Row Count"], 0);
    }

    #[test]
    fn test_empty_grouped_has_no_groups() {
        assert_eq!(
            aggregate(&[], &[OrderField::Country]).unwrap(),
            Aggregations::Grouped(vec![])
        );
    }

    #[test]
    fn test_grouped_json_shape() {
        let json = serde_json::to_value(aggregate(&sample(), &[OrderField::Region]).unwrap()).unwrap();
        let groups = json.as_array().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0]["Group"]["Region"], "Asia");
        assert_eq!(groups[0]["Total Units Sold"], 14);
    }

    #[test]
    fn test_units_sum_overflow_is_an_error() {
        let rows = vec![
            row(1, 100, "Asia", "Snacks", i64::MAX, 1.0, 0.0),
            row(2, 101, "Asia", "Snacks", 1, 1.0, 0.0),
        ];
        let err = aggregate(&rows, &[]).unwrap_err();
        assert!(matches!(err, OrdersError::AggregateOverflow { .. }));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("Total Units Sold"));

        let err = aggregate(&rows, &[OrderField::Region]).unwrap_err();
        assert!(matches!(err, OrdersError::AggregateOverflow { .. }));

        // A lone extreme row still fits
        let Aggregations::Overall(stats) = aggregate(&rows[..1], &[]).unwrap() else {
            panic!("expected overall aggregates");
        };
        assert_eq!(stats.total_units_sold, Some(i64::MAX));
    }
}
