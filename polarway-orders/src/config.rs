//! Configuration for the order pipeline

use std::path::{Path, PathBuf};

use crate::schema::TABLE_ORDERS;

/// Date format used by the source files (`month/day/year`, padding optional)
pub const DEFAULT_DATE_FORMAT: &str = "%m/%d/%Y";

/// Date format for every date written back out: store columns and JSON.
/// Fixed so stored text and API text never disagree.
pub const DEFAULT_OUTPUT_DATE_FORMAT: &str = "%-m/%-d/%Y";

/// Order pipeline configuration
#[derive(Debug, Clone)]
pub struct OrdersConfig {
    /// Root path holding the Delta table directory
    pub base_path: PathBuf,

    /// Name of the orders table under `base_path`
    pub table_name: String,

    /// chrono format for parsing `Order Date` / `Ship Date`
    pub date_format: String,
}

impl OrdersConfig {
    /// Create config with sensible defaults
    ///
    /// # Arguments
    /// * `base_path` - Root directory of the database.
    ///   Structure created:
    ///   ```text
    ///   base_path/
    ///   └── orders/          (Delta table, append-only)
    ///   ```
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            table_name: TABLE_ORDERS.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }

    /// Override the table name
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    /// Override the input date format
    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = format.into();
        self
    }

    /// Path of the orders table directory
    pub fn table_path(&self) -> PathBuf {
        self.base_path.join(&self.table_name)
    }

    /// Table URI (string) for delta-rs
    pub fn table_uri(&self) -> String {
        self.table_path().to_string_lossy().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = OrdersConfig::new("/tmp/orders_db");
        assert_eq!(cfg.table_name, "orders");
        assert_eq!(cfg.date_format, "%m/%d/%Y");
        assert_eq!(cfg.table_uri(), "/tmp/orders_db/orders");
    }

    #[test]
    fn test_builder_pattern() {
        let cfg = OrdersConfig::new("/data")
            .with_table_name("orders_v2")
            .with_date_format("%Y-%m-%d");

        assert_eq!(cfg.table_name, "orders_v2");
        assert_eq!(cfg.date_format, "%Y-%m-%d");
        assert_eq!(cfg.table_path(), PathBuf::from("/data/orders_v2"));
    }
}
