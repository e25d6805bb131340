//! Query plan: request field names resolved against the allow-list

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{OrdersError, Result};
use crate::schema::{FieldFilter, OrderField};

/// Filter/group-by request as received from a caller
///
/// Field names are unchecked text until [`QueryPlan::build`] runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQuery {
    #[serde(rename = "Filters", default)]
    pub filters: BTreeMap<String, String>,
    #[serde(rename = "Group By", default)]
    pub group_by: Vec<String>,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.group_by.push(field.into());
        self
    }
}

/// Validated query: allow-listed fields, values kept as bound literals
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlan {
    filters: Vec<FieldFilter>,
    group_by: Vec<OrderField>,
}

fn resolve(name: &str) -> Result<OrderField> {
    OrderField::parse(name).ok_or_else(|| OrdersError::UnknownField(name.to_string()))
}

impl QueryPlan {
    /// Validate a request. Fails on the first field outside the allow-list.
    pub fn build(query: &OrderQuery) -> Result<Self> {
        let mut filters: Vec<FieldFilter> = Vec::with_capacity(query.filters.len());
        for (name, value) in &query.filters {
            let field = resolve(name)?;
            // An empty value places no constraint
            if value.is_empty() {
                continue;
            }
            if let Some(existing) = filters.iter().find(|f| f.field == field) {
                if existing.value != *value {
                    return Err(OrdersError::InvalidRequest(format!(
                        "conflicting filters for field '{}'",
                        field.canonical_name()
                    )));
                }
                continue;
            }
            filters.push(FieldFilter::new(field, value.clone()));
        }

        let mut group_by = Vec::with_capacity(query.group_by.len());
        for name in &query.group_by {
            let field = resolve(name)?;
            if !group_by.contains(&field) {
                group_by.push(field);
            }
        }

        Ok(Self { filters, group_by })
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    pub fn group_by(&self) -> &[OrderField] {
        &self.group_by
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_filter_rejected() {
        let query = OrderQuery::new().filter("Discount", "10%");
        let err = QueryPlan::build(&query).unwrap_err();
        assert!(matches!(err, OrdersError::UnknownField(ref f) if f == "Discount"));
    }

    #[test]
    fn test_unknown_group_by_rejected() {
        let query = OrderQuery::new().group_by("Region").group_by("1; DROP TABLE orders");
        let err = QueryPlan::build(&query).unwrap_err();
        assert!(err.to_string().contains("DROP TABLE"));
    }

    #[test]
    fn test_both_spellings_resolve() {
        let query = OrderQuery::new()
            .filter("Item Type", "Snacks")
            .filter("SalesChannel", "Online")
            .group_by("Order Priority");
        let plan = QueryPlan::build(&query).unwrap();
        assert_eq!(plan.filters().len(), 2);
        assert!(plan.filters().contains(&FieldFilter::new(OrderField::ItemType, "Snacks")));
        assert_eq!(plan.group_by(), &[OrderField::OrderPriority]);
    }

    #[test]
    fn test_empty_value_is_no_constraint() {
        let plan = QueryPlan::build(&OrderQuery::new().filter("Region", "")).unwrap();
        assert!(plan.filters().is_empty());
    }

    #[test]
    fn test_conflicting_spellings_rejected() {
        let query = OrderQuery::new().filter("Item Type", "Snacks").filter("ItemType", "Fruits");
        assert!(matches!(
            QueryPlan::build(&query).unwrap_err(),
            OrdersError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_duplicate_group_by_collapsed() {
        let query = OrderQuery::new().group_by("Region").group_by("Country").group_by("Region");
        let plan = QueryPlan::build(&query).unwrap();
        assert_eq!(plan.group_by(), &[OrderField::Region, OrderField::Country]);
    }

    #[test]
    fn test_injection_value_kept_verbatim() {
        let plan = QueryPlan::build(&OrderQuery::new().filter("Region", "A' OR '1'='1")).unwrap();
        assert_eq!(plan.filters()[0].value, "A' OR '1'='1");
    }

    #[test]
    fn test_request_json_shape() {
        let query: OrderQuery = serde_json::from_str(
            r#"{"Filters": {"Region": "Asia"}, "Group By": ["Item Type"]}"#,
        )
        .unwrap();
        assert_eq!(query.filters["Region"], "Asia");
        assert_eq!(query.group_by, vec!["Item Type"]);

        let empty: OrderQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, OrderQuery::default());

        assert!(serde_json::from_str::<OrderQuery>(r#"{"Where": "1=1"}"#).is_err());
    }
}
