// Generic serverless handler for the Polarway order pipeline
// Cloud-agnostic interface that can be adapted to any serverless platform

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use polarway_orders::config::DEFAULT_DATE_FORMAT;
use polarway_orders::csv_io::{read_transformed_rows, transform_csv};
use polarway_orders::{
    DeltaOrderStore, ErrorKind, OrderQuery, OrderStore, OrdersConfig, OrdersError, QueryEngine,
    QueryPlan, Transformer,
};

#[cfg(feature = "metrics")]
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub mod blob;
pub mod config;

pub use blob::{BlobStore, LocalBlobStore};
pub use config::ServerlessConfig;

#[derive(Error, Debug)]
pub enum ServerlessError {
    #[error("Not found")]
    NotFound,
    #[error("Object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Orders(#[from] OrdersError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(String),
    #[cfg(feature = "metrics")]
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ServerlessError {
    /// HTTP status reported for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound | Self::ObjectNotFound { .. } => 404,
            Self::BadRequest(_) => 400,
            Self::Orders(OrdersError::TableNotFound(_)) => 404,
            Self::Orders(e) => match e.kind() {
                ErrorKind::MalformedInput | ErrorKind::InvalidRequest => 400,
                ErrorKind::Storage | ErrorKind::Internal => 500,
            },
            Self::Io(_) | Self::Internal(_) => 500,
            #[cfg(feature = "metrics")]
            Self::Metrics(_) => 500,
        }
    }
}

fn bad_request(e: impl std::fmt::Display) -> ServerlessError {
    ServerlessError::BadRequest(e.to_string())
}

fn join_error(e: tokio::task::JoinError) -> ServerlessError {
    ServerlessError::Internal(format!("Task join error: {e}"))
}

/// Metrics collector
#[cfg(feature = "metrics")]
pub struct Metrics {
    pub request_count: IntCounter,
    pub request_errors: IntCounterVec,
    pub request_duration: HistogramVec,
    pub registry: Registry,
}

#[cfg(feature = "metrics")]
impl Metrics {
    pub fn new() -> Result<Self, ServerlessError> {
        let registry = Registry::new();

        let request_count = IntCounter::new("polarway_orders_requests_total", "Total requests")?;
        registry.register(Box::new(request_count.clone()))?;

        let request_errors = IntCounterVec::new(
            Opts::new("polarway_orders_request_errors_total", "Failed requests"),
            &["endpoint", "status"],
        )?;
        registry.register(Box::new(request_errors.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("polarway_orders_request_duration_seconds", "Request duration"),
            &["endpoint"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            request_count,
            request_errors,
            request_duration,
            registry,
        })
    }

    pub fn export(&self) -> Result<String, ServerlessError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ServerlessError::Internal(e.to_string()))
    }
}

/// Cloud-agnostic HTTP request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerlessRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub query_params: HashMap<String, String>,
}

impl ServerlessRequest {
    pub fn new(method: &str, path: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            headers: HashMap::new(),
            body: body.into(),
            query_params: HashMap::new(),
        }
    }
}

/// Cloud-agnostic HTTP response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerlessResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Response body: payload fields next to `statusCode`
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    #[serde(rename = "statusCode")]
    status_code: u16,
    #[serde(flatten)]
    payload: &'a T,
}

fn json_headers() -> HashMap<String, String> {
    HashMap::from([("Content-Type".to_string(), "application/json".to_string())])
}

impl ServerlessResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status_code: 200,
            headers: json_headers(),
            body,
        }
    }

    /// 200 response carrying `payload` merged with `statusCode`
    pub fn json<T: Serialize>(payload: &T) -> Result<Self, ServerlessError> {
        let body = serde_json::to_vec(&Envelope {
            status_code: 200,
            payload,
        })
        .map_err(|e| ServerlessError::Internal(e.to_string()))?;
        Ok(Self::ok(body))
    }

    pub fn error(status_code: u16, message: &str) -> Self {
        let body = serde_json::json!({ "statusCode": status_code, "error": message })
            .to_string()
            .into_bytes();
        Self {
            status_code,
            headers: json_headers(),
            body,
        }
    }
}

/// Generic serverless handler trait
#[async_trait::async_trait]
pub trait ServerlessHandler: Send + Sync {
    async fn handle_request(
        &self,
        req: ServerlessRequest,
    ) -> Result<ServerlessResponse, ServerlessError>;

    /// Like `handle_request`, with failures rendered as error responses
    async fn respond(&self, req: ServerlessRequest) -> ServerlessResponse {
        let path = req.path.clone();
        match self.handle_request(req).await {
            Ok(resp) => resp,
            Err(e) => {
                let status = e.status_code();
                if status >= 500 {
                    error!(path = %path, status, error = %e, "Request failed");
                } else {
                    warn!(path = %path, status, error = %e, "Request rejected");
                }
                ServerlessResponse::error(status, &e.to_string())
            }
        }
    }
}

// ─── Stage payloads ───

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformRequest {
    pub bucket_name: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadRequest {
    pub bucket_name: String,
    pub key: String,
    #[serde(default)]
    pub db_file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryRequest {
    pub bucket_name: String,
    pub key: String,
    #[serde(rename = "Filters", default)]
    pub filters: BTreeMap<String, String>,
    #[serde(rename = "Group By", default)]
    pub group_by: Vec<String>,
}

impl QueryRequest {
    pub fn order_query(&self) -> OrderQuery {
        OrderQuery {
            filters: self.filters.clone(),
            group_by: self.group_by.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TransformResponse {
    bucket_name: String,
    key: String,
    rows_read: usize,
    rows_written: usize,
    duplicates: usize,
}

#[derive(Debug, Serialize)]
struct LoadResponse {
    message: &'static str,
    bucket_name: String,
    key: String,
    rows_loaded: usize,
}

/// Decode a stage payload. Also accepts the payload wrapped as
/// `{"body": <object or JSON string>}`, as API gateways deliver it.
pub fn parse_payload<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServerlessError> {
    use serde_json::Value;

    let value: Value = serde_json::from_slice(body).map_err(bad_request)?;
    let value = match value {
        Value::Object(mut map) if map.len() == 1 => match map.remove("body") {
            Some(Value::String(inner)) => serde_json::from_str(&inner).map_err(bad_request)?,
            Some(inner) => inner,
            None => Value::Object(map),
        },
        other => other,
    };
    serde_json::from_value(value).map_err(bad_request)
}

fn endpoint_label(path: &str) -> &'static str {
    match path {
        "/health" | "/api/health" => "health",
        "/api/transform" => "transform",
        "/api/load" => "load",
        "/api/query" => "query",
        "/metrics" => "metrics",
        _ => "unknown",
    }
}

/// Transform / load / query entry points over a [`BlobStore`]
pub struct OrdersHandler {
    config: ServerlessConfig,
    blobs: Arc<dyn BlobStore>,
    #[cfg(feature = "metrics")]
    metrics: Arc<Metrics>,
}

impl OrdersHandler {
    pub fn new(config: ServerlessConfig, blobs: Arc<dyn BlobStore>) -> Result<Self, ServerlessError> {
        Ok(Self {
            config,
            blobs,
            #[cfg(feature = "metrics")]
            metrics: Arc::new(Metrics::new()?),
        })
    }

    /// Handler over a [`LocalBlobStore`] rooted at `config.data_root`
    pub fn from_config(config: ServerlessConfig) -> Result<Self, ServerlessError> {
        let blobs = Arc::new(LocalBlobStore::new(config.data_root.clone()));
        Self::new(config, blobs)
    }

    pub fn config(&self) -> &ServerlessConfig {
        &self.config
    }

    /// Raw CSV → transformed CSV in the transformed bucket
    async fn transform(&self, req: ServerlessRequest) -> Result<ServerlessResponse, ServerlessError> {
        let params: TransformRequest = parse_payload(&req.body)?;
        let input = self.blobs.get(&params.bucket_name, &params.key).await?;

        let (summary, output) = tokio::task::spawn_blocking(move || -> Result<_, OrdersError> {
            let mut output = Vec::new();
            let summary = transform_csv(&Transformer::default(), input.as_slice(), &mut output)?;
            Ok((summary, output))
        })
        .await
        .map_err(join_error)??;

        let key = format!("transformed_{}", params.key);
        self.blobs.put(&self.config.transformed_bucket, &key, output).await?;

        info!(
            source = %format!("{}/{}", params.bucket_name, params.key),
            target = %format!("{}/{}", self.config.transformed_bucket, key),
            rows_written = summary.rows_written,
            "Transform stage complete"
        );
        ServerlessResponse::json(&TransformResponse {
            bucket_name: self.config.transformed_bucket.clone(),
            key,
            rows_read: summary.rows_read,
            rows_written: summary.rows_written,
            duplicates: summary.duplicates,
        })
    }

    /// Transformed CSV → one append into `databases/<db_file_name>`
    async fn load(&self, req: ServerlessRequest) -> Result<ServerlessResponse, ServerlessError> {
        let params: LoadRequest = parse_payload(&req.body)?;
        let db_file_name = params
            .db_file_name
            .unwrap_or_else(|| self.config.default_db_file_name.clone());
        if db_file_name.contains('/') {
            return Err(ServerlessError::BadRequest(format!("Invalid db_file_name: '{db_file_name}'")));
        }
        let db_key = self.config.database_key(&db_file_name);
        let db_path = self.blobs.locate(&params.bucket_name, &db_key)?;

        let input = self.blobs.get(&params.bucket_name, &params.key).await?;
        let records = tokio::task::spawn_blocking(move || read_transformed_rows(input.as_slice(), DEFAULT_DATE_FORMAT))
            .await
            .map_err(join_error)??;

        let store = DeltaOrderStore::new(OrdersConfig::new(&db_path)).await?;
        let rows_loaded = store.append(&records).await?;

        info!(
            bucket = %params.bucket_name,
            database = %db_key,
            rows_loaded,
            "Load stage complete"
        );
        ServerlessResponse::json(&LoadResponse {
            message: "Database created and uploaded successfully",
            bucket_name: params.bucket_name,
            key: db_key,
            rows_loaded,
        })
    }

    /// Filters + group-by over an existing database
    async fn query(&self, req: ServerlessRequest) -> Result<ServerlessResponse, ServerlessError> {
        let params: QueryRequest = parse_payload(&req.body)?;
        // Validate before touching storage
        let plan = QueryPlan::build(&params.order_query())?;

        let db_path = self.blobs.locate(&params.bucket_name, &params.key)?;
        if !db_path.exists() {
            return Err(ServerlessError::ObjectNotFound {
                bucket: params.bucket_name,
                key: params.key,
            });
        }

        let store = Arc::new(DeltaOrderStore::open(OrdersConfig::new(&db_path)).await?);
        let outcome = QueryEngine::new(store).execute(&plan).await?;
        ServerlessResponse::json(&outcome)
    }

    async fn health_check(&self) -> Result<ServerlessResponse, ServerlessError> {
        let response = serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        Ok(ServerlessResponse::ok(response.to_string().into_bytes()))
    }

    #[cfg(feature = "metrics")]
    async fn metrics_endpoint(&self) -> Result<ServerlessResponse, ServerlessError> {
        let metrics_text = self.metrics.export()?;
        Ok(ServerlessResponse {
            status_code: 200,
            headers: HashMap::from([("Content-Type".to_string(), "text/plain; version=0.0.4".to_string())]),
            body: metrics_text.into_bytes(),
        })
    }
}

#[async_trait::async_trait]
impl ServerlessHandler for OrdersHandler {
    async fn handle_request(
        &self,
        req: ServerlessRequest,
    ) -> Result<ServerlessResponse, ServerlessError> {
        let endpoint = endpoint_label(&req.path);
        info!(method = %req.method, path = %req.path, "Handling request");

        #[cfg(feature = "metrics")]
        let timer = {
            self.metrics.request_count.inc();
            self.metrics.request_duration.with_label_values(&[endpoint]).start_timer()
        };

        let result = match endpoint {
            "health" => self.health_check().await,
            "transform" => self.transform(req).await,
            "load" => self.load(req).await,
            "query" => self.query(req).await,
            #[cfg(feature = "metrics")]
            "metrics" => self.metrics_endpoint().await,
            _ => Err(ServerlessError::NotFound),
        };

        #[cfg(feature = "metrics")]
        {
            timer.observe_duration();
            if let Err(e) = &result {
                self.metrics
                    .request_errors
                    .with_label_values(&[endpoint, &e.status_code().to_string()])
                    .inc();
            }
        }

        result
    }
}
