//! Order record schema: domain types, external column names and the
//! Arrow / Delta definitions of the `orders` table
//!
//! The table has:
//! - An Arrow `Schema` for RecordBatch construction
//! - A list of Delta `StructField`s for table creation
//! - No partition columns (single append-only log)

use chrono::NaiveDate;
use deltalake::arrow::datatypes::{DataType, Field, Schema};
use deltalake::kernel::{DataType as DeltaDataType, PrimitiveType, StructField};
use serde::{Deserialize, Serialize};

// ─── Table Names (constants) ───

pub const TABLE_ORDERS: &str = "orders";

// ─── External Column Names (CSV headers) ───

pub const COL_REGION: &str = "Region";
pub const COL_COUNTRY: &str = "Country";
pub const COL_ITEM_TYPE: &str = "Item Type";
pub const COL_SALES_CHANNEL: &str = "Sales Channel";
pub const COL_ORDER_PRIORITY: &str = "Order Priority";
pub const COL_ORDER_DATE: &str = "Order Date";
pub const COL_ORDER_ID: &str = "Order ID";
pub const COL_SHIP_DATE: &str = "Ship Date";
pub const COL_UNITS_SOLD: &str = "Units Sold";
pub const COL_UNIT_PRICE: &str = "Unit Price";
pub const COL_UNIT_COST: &str = "Unit Cost";
pub const COL_TOTAL_REVENUE: &str = "Total Revenue";
pub const COL_TOTAL_COST: &str = "Total Cost";
pub const COL_TOTAL_PROFIT: &str = "Total Profit";
pub const COL_ORDER_PROCESSING_TIME: &str = "Order Processing Time";
pub const COL_GROSS_MARGIN: &str = "Gross Margin";

/// Columns every source file must carry
pub const SOURCE_COLUMNS: [&str; 14] = [
    COL_REGION,
    COL_COUNTRY,
    COL_ITEM_TYPE,
    COL_SALES_CHANNEL,
    COL_ORDER_PRIORITY,
    COL_ORDER_DATE,
    COL_ORDER_ID,
    COL_SHIP_DATE,
    COL_UNITS_SOLD,
    COL_UNIT_PRICE,
    COL_UNIT_COST,
    COL_TOTAL_REVENUE,
    COL_TOTAL_COST,
    COL_TOTAL_PROFIT,
];

/// Columns appended by the transformer
pub const DERIVED_COLUMNS: [&str; 2] = [COL_ORDER_PROCESSING_TIME, COL_GROSS_MARGIN];

// ─── Order Priority ───

/// Normalized order priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderPriority {
    High,
    Critical,
    Low,
    Medium,
    Unknown,
}

impl OrderPriority {
    /// Normalize a single-letter source code. Never fails.
    pub fn from_code(code: &str) -> Self {
        match code {
            "H" => Self::High,
            "C" => Self::Critical,
            "L" => Self::Low,
            "M" => Self::Medium,
            _ => Self::Unknown,
        }
    }

    /// Parse an already-normalized label (transformed files, stored rows)
    pub fn from_label(label: &str) -> Self {
        match label {
            "High" => Self::High,
            "Critical" => Self::Critical,
            "Low" => Self::Low,
            "Medium" => Self::Medium,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Critical => "Critical",
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for OrderPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Order Record ───

/// One enriched row of the `orders` table. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "ItemType")]
    pub item_type: String,
    #[serde(rename = "SalesChannel")]
    pub sales_channel: String,
    #[serde(rename = "OrderPriority")]
    pub order_priority: OrderPriority,
    #[serde(rename = "OrderDate", with = "external_date")]
    pub order_date: NaiveDate,
    #[serde(rename = "OrderID")]
    pub order_id: i64,
    #[serde(rename = "ShipDate", with = "external_date")]
    pub ship_date: NaiveDate,
    #[serde(rename = "UnitsSold")]
    pub units_sold: i64,
    #[serde(rename = "UnitPrice")]
    pub unit_price: f64,
    #[serde(rename = "UnitCost")]
    pub unit_cost: f64,
    #[serde(rename = "TotalRevenue")]
    pub total_revenue: f64,
    #[serde(rename = "TotalCost")]
    pub total_cost: f64,
    #[serde(rename = "TotalProfit")]
    pub total_profit: f64,
    #[serde(rename = "OrderProcessingTime")]
    pub order_processing_time: i64,
    #[serde(rename = "GrossMargin")]
    pub gross_margin: f64,
}

/// Whole days between order placement and shipment; negative when the
/// source dates are inverted
pub fn processing_days(order_date: NaiveDate, ship_date: NaiveDate) -> i64 {
    ship_date.signed_duration_since(order_date).num_days()
}

/// Profit over revenue, exactly 0 when revenue is 0
pub fn gross_margin(total_profit: f64, total_revenue: f64) -> f64 {
    if total_revenue == 0.0 {
        0.0
    } else {
        total_profit / total_revenue
    }
}

/// An `OrderRecord` as persisted, with its surrogate key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOrder {
    pub id: i64,
    #[serde(flatten)]
    pub record: OrderRecord,
}

// ─── Queryable Fields ───

/// Fields that may appear in a filter or group-by. Nothing outside this
/// enumeration can reach a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OrderField {
    Region,
    Country,
    ItemType,
    SalesChannel,
    OrderPriority,
}

impl OrderField {
    pub const ALL: [OrderField; 5] = [
        Self::Region,
        Self::Country,
        Self::ItemType,
        Self::SalesChannel,
        Self::OrderPriority,
    ];

    /// Resolve a request field name. Accepts the canonical name (`ItemType`)
    /// and the source column name (`Item Type`).
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.canonical_name() == name || f.column_name() == name)
    }

    pub fn canonical_name(&self) -> &'static str {
        match self {
            Self::Region => "Region",
            Self::Country => "Country",
            Self::ItemType => "ItemType",
            Self::SalesChannel => "SalesChannel",
            Self::OrderPriority => "OrderPriority",
        }
    }

    pub fn column_name(&self) -> &'static str {
        match self {
            Self::Region => COL_REGION,
            Self::Country => COL_COUNTRY,
            Self::ItemType => COL_ITEM_TYPE,
            Self::SalesChannel => COL_SALES_CHANNEL,
            Self::OrderPriority => COL_ORDER_PRIORITY,
        }
    }

    /// Column name in the `orders` table
    pub fn store_column(&self) -> &'static str {
        match self {
            Self::Region => FIELD_REGION,
            Self::Country => FIELD_COUNTRY,
            Self::ItemType => FIELD_ITEM_TYPE,
            Self::SalesChannel => FIELD_SALES_CHANNEL,
            Self::OrderPriority => FIELD_ORDER_PRIORITY,
        }
    }

    pub fn value_of<'r>(&self, record: &'r OrderRecord) -> &'r str {
        match self {
            Self::Region => &record.region,
            Self::Country => &record.country,
            Self::ItemType => &record.item_type,
            Self::SalesChannel => &record.sales_channel,
            Self::OrderPriority => record.order_priority.as_str(),
        }
    }
}

/// Exact-match constraint on one allow-listed field. The value is data,
/// compared as a literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: OrderField,
    pub value: String,
}

impl FieldFilter {
    pub fn new(field: OrderField, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }

    pub fn matches(&self, record: &OrderRecord) -> bool {
        self.field.value_of(record) == self.value
    }
}

/// JSON form of dates: the same `month/day/year` text the source files use.
/// Always the fixed default formats, which is also what the store writes.
mod external_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::config::{DEFAULT_DATE_FORMAT, DEFAULT_OUTPUT_DATE_FORMAT};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(DEFAULT_OUTPUT_DATE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&text, DEFAULT_DATE_FORMAT).map_err(serde::de::Error::custom)
    }
}

// ─── Orders Table ───

pub const FIELD_ID: &str = "id";
pub const FIELD_REGION: &str = "region";
pub const FIELD_COUNTRY: &str = "country";
pub const FIELD_ITEM_TYPE: &str = "item_type";
pub const FIELD_SALES_CHANNEL: &str = "sales_channel";
pub const FIELD_ORDER_PRIORITY: &str = "order_priority";
pub const FIELD_ORDER_DATE: &str = "order_date";
pub const FIELD_ORDER_ID: &str = "order_id";
pub const FIELD_SHIP_DATE: &str = "ship_date";
pub const FIELD_UNITS_SOLD: &str = "units_sold";
pub const FIELD_UNIT_PRICE: &str = "unit_price";
pub const FIELD_UNIT_COST: &str = "unit_cost";
pub const FIELD_TOTAL_REVENUE: &str = "total_revenue";
pub const FIELD_TOTAL_COST: &str = "total_cost";
pub const FIELD_TOTAL_PROFIT: &str = "total_profit";
pub const FIELD_ORDER_PROCESSING_TIME: &str = "order_processing_time";
pub const FIELD_GROSS_MARGIN: &str = "gross_margin";

/// Column layout of the `orders` table: (name, type)
const ORDERS_COLUMNS: [(&str, PrimitiveType); 17] = [
    (FIELD_ID, PrimitiveType::Long),
    (FIELD_REGION, PrimitiveType::String),
    (FIELD_COUNTRY, PrimitiveType::String),
    (FIELD_ITEM_TYPE, PrimitiveType::String),
    (FIELD_SALES_CHANNEL, PrimitiveType::String),
    (FIELD_ORDER_PRIORITY, PrimitiveType::String),
    (FIELD_ORDER_DATE, PrimitiveType::String),
    (FIELD_ORDER_ID, PrimitiveType::Long),
    (FIELD_SHIP_DATE, PrimitiveType::String),
    (FIELD_UNITS_SOLD, PrimitiveType::Long),
    (FIELD_UNIT_PRICE, PrimitiveType::Double),
    (FIELD_UNIT_COST, PrimitiveType::Double),
    (FIELD_TOTAL_REVENUE, PrimitiveType::Double),
    (FIELD_TOTAL_COST, PrimitiveType::Double),
    (FIELD_TOTAL_PROFIT, PrimitiveType::Double),
    (FIELD_ORDER_PROCESSING_TIME, PrimitiveType::Long),
    (FIELD_GROSS_MARGIN, PrimitiveType::Double),
];

fn arrow_type(primitive: &PrimitiveType) -> DataType {
    match primitive {
        PrimitiveType::Long => DataType::Int64,
        PrimitiveType::Double => DataType::Float64,
        _ => DataType::Utf8,
    }
}

/// Arrow schema for the `orders` Delta table
pub fn orders_arrow_schema() -> Schema {
    Schema::new(
        ORDERS_COLUMNS
            .iter()
            .map(|(name, ty)| Field::new(*name, arrow_type(ty), false))
            .collect::<Vec<_>>(),
    )
}

/// Delta StructFields for `orders` table creation
pub fn orders_delta_fields() -> Vec<StructField> {
    ORDERS_COLUMNS
        .iter()
        .map(|(name, ty)| StructField::new(*name, DeltaDataType::Primitive(ty.clone()), false))
        .collect()
}

pub fn orders_partition_columns() -> Vec<String> {
    vec![] // Append-only log, scanned whole
}
