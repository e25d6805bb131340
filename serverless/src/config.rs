//! Runtime configuration for the serverless entry points

use std::path::PathBuf;

/// Default object-storage root when `ORDERS_DATA_ROOT` is unset
pub const DEFAULT_DATA_ROOT: &str = "./data";
/// Bucket receiving `transformed_<key>` files
pub const DEFAULT_TRANSFORMED_BUCKET: &str = "transformed";
/// Key prefix under which loaded databases live
pub const DEFAULT_DATABASE_PREFIX: &str = "databases";
/// Database name used when a load request doesn't name one
pub const DEFAULT_DB_FILE_NAME: &str = "data.db";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct ServerlessConfig {
    /// Root directory of the local blob store (one sub-directory per bucket)
    pub data_root: PathBuf,
    pub transformed_bucket: String,
    pub database_prefix: String,
    pub default_db_file_name: String,
    pub port: u16,
}

impl ServerlessConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            transformed_bucket: DEFAULT_TRANSFORMED_BUCKET.to_string(),
            database_prefix: DEFAULT_DATABASE_PREFIX.to_string(),
            default_db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            port: DEFAULT_PORT,
        }
    }

    pub fn with_transformed_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.transformed_bucket = bucket.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Read configuration from the environment
    ///
    /// Azure Functions uses `FUNCTIONS_CUSTOMHANDLER_PORT`, others use `PORT`.
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let data_root = std::env::var("ORDERS_DATA_ROOT").unwrap_or_else(|_| DEFAULT_DATA_ROOT.to_string());
        let port = std::env::var("FUNCTIONS_CUSTOMHANDLER_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
            .unwrap_or(DEFAULT_PORT);

        let mut config = Self::new(data_root).with_port(port);
        if let Ok(bucket) = std::env::var("ORDERS_TRANSFORMED_BUCKET") {
            config = config.with_transformed_bucket(bucket);
        }
        config
    }

    /// Blob key of a loaded database
    pub fn database_key(&self, db_file_name: &str) -> String {
        format!("{}/{}", self.database_prefix, db_file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerlessConfig::new("/tmp/blobs");
        assert_eq!(config.transformed_bucket, "transformed");
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_key("data.db"), "databases/data.db");
    }

    #[test]
    fn test_builders() {
        let config = ServerlessConfig::new("/tmp/blobs")
            .with_transformed_bucket("clean")
            .with_port(9000);
        assert_eq!(config.transformed_bucket, "clean");
        assert_eq!(config.port, 9000);
    }
}
