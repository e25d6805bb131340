// Generic HTTP server using Axum
// Works on any cloud provider or self-hosted environment

use axum::{
    body::Body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polarway_orders_serverless::{
    OrdersHandler, ServerlessConfig, ServerlessHandler, ServerlessRequest, ServerlessResponse,
};

/// Request bodies larger than this are rejected
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Convert axum::Request to ServerlessRequest
async fn to_serverless_request(req: axum::extract::Request) -> Result<ServerlessRequest, Response> {
    let (parts, body) = req.into_parts();

    let headers = parts
        .headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();

    let query_params = parts
        .uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
        let resp = ServerlessResponse::error(StatusCode::PAYLOAD_TOO_LARGE.as_u16(), &e.to_string());
        from_serverless_response(resp)
    })?;

    Ok(ServerlessRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        headers,
        body: body.to_vec(),
        query_params,
    })
}

/// Convert ServerlessResponse to axum::Response
fn from_serverless_response(resp: ServerlessResponse) -> Response {
    let mut response = Response::builder().status(resp.status_code);

    for (key, value) in resp.headers {
        response = response.header(key, value);
    }

    response
        .body(Body::from(resp.body))
        .unwrap_or_else(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response())
}

/// Generic handler endpoint
async fn handle_request(
    State(handler): State<Arc<dyn ServerlessHandler>>,
    req: axum::extract::Request,
) -> Response {
    match to_serverless_request(req).await {
        Ok(serverless_req) => from_serverless_response(handler.respond(serverless_req).await),
        Err(resp) => resp,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "polarway_orders=debug,polarway_orders_serverless=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerlessConfig::from_env();
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        data_root = %config.data_root.display(),
        transformed_bucket = %config.transformed_bucket,
        "Starting order pipeline server"
    );

    let handler: Arc<dyn ServerlessHandler> = Arc::new(OrdersHandler::from_config(config)?);

    let app = Router::new()
        .route("/health", get(handle_request))
        .route("/metrics", get(handle_request))
        .route("/api/*path", post(handle_request).get(handle_request))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(handler);

    tracing::info!("Polarway orders HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
