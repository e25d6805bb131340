//! Error types for polarway-orders (railway programming)
//!
//! All operations return `Result<T, OrdersError>`.
//! No panics, no unwraps in production code paths.

use thiserror::Error;

/// Coarse classification used by callers to pick a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input file or row could not be parsed
    MalformedInput,
    /// Request rejected before any data access
    InvalidRequest,
    /// Backing store failed to read or write
    Storage,
    Internal,
}

/// Unified error type for all order pipeline operations
#[derive(Error, Debug)]
pub enum OrdersError {
    // ─── Input Errors ───

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Malformed value in row {row}, field '{field}': {reason}")]
    MalformedField {
        row: usize,
        field: String,
        reason: String,
    },

    #[error("CSV error: {0}")]
    Csv(String),

    // ─── Request Errors ───

    #[error("Unknown field '{0}': not in the filter/group-by allow-list")]
    UnknownField(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ─── Storage Errors ───

    #[error("Delta table error: {0}")]
    DeltaTable(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Corrupt stored row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },

    #[error("Arrow error: {0}")]
    Arrow(String),

    #[error("DataFusion error: {0}")]
    DataFusion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─── Query Errors ───

    #[error("Aggregate '{statistic}' overflowed")]
    AggregateOverflow { statistic: String },

    // ─── Infrastructure Errors ───

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OrdersError {
    pub fn malformed(row: usize, field: &str, reason: impl Into<String>) -> Self {
        OrdersError::MalformedField {
            row,
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingColumn(_) | Self::MalformedField { .. } | Self::Csv(_) => {
                ErrorKind::MalformedInput
            }
            Self::UnknownField(_) | Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::DeltaTable(_)
            | Self::TableNotFound(_)
            | Self::CorruptRow { .. }
            | Self::Arrow(_)
            | Self::DataFusion(_)
            | Self::Io(_) => ErrorKind::Storage,
            Self::AggregateOverflow { .. }
            | Self::Serialization(_)
            | Self::Config(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<deltalake::DeltaTableError> for OrdersError {
    fn from(err: deltalake::DeltaTableError) -> Self {
        OrdersError::DeltaTable(err.to_string())
    }
}

impl From<deltalake::arrow::error::ArrowError> for OrdersError {
    fn from(err: deltalake::arrow::error::ArrowError) -> Self {
        OrdersError::Arrow(err.to_string())
    }
}

impl From<deltalake::datafusion::error::DataFusionError> for OrdersError {
    fn from(err: deltalake::datafusion::error::DataFusionError) -> Self {
        OrdersError::DataFusion(err.to_string())
    }
}

impl From<serde_json::Error> for OrdersError {
    fn from(err: serde_json::Error) -> Self {
        OrdersError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for OrdersError {
    fn from(err: csv::Error) -> Self {
        OrdersError::Csv(err.to_string())
    }
}

impl From<url::ParseError> for OrdersError {
    fn from(err: url::ParseError) -> Self {
        OrdersError::Config(format!("URL parse error: {err}"))
    }
}

/// Result type alias for order pipeline operations
pub type Result<T> = std::result::Result<T, OrdersError>;
