//! HTTP server for bulk price import/export
//!
//! Routes:
//! - `POST /api/v0/prices`: upload a zipped CSV, returns [`UploadStats`]
//! - `GET /api/v0/prices`: download every record as `prices.zip`
//! - `GET /api/v0/prices/summary`: store-wide totals
//! - `GET /health`: liveness plus a database check
//!
//! Errors are JSON `{"error": "..."}`. Anything wrong with the uploaded data
//! (media type, empty body, broken zip, missing CSV, malformed rows) is a 400;
//! storage and export failures are a 500.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::Config;
use crate::error::{ErrorClass, PriceError, Result};
use crate::models::{StoreSummary, UploadStats};
use crate::service::{PriceService, ZIP_CONTENT_TYPE};

/// `Content-Disposition` of export downloads
const EXPORT_DISPOSITION: &str = "attachment; filename=\"prices.zip\"";

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: PriceService,
}

/// Error response body
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Health check response body
#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    database: &'static str,
}

impl IntoResponse for PriceError {
    fn into_response(self) -> Response {
        let status = match self.class() {
            ErrorClass::Client => {
                log::warn!("Rejected request: {}", self);
                StatusCode::BAD_REQUEST
            }
            ErrorClass::Server => {
                log::error!("Request failed: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Run blocking pipeline work (zip, CSV, SQLite) off the async workers
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PriceError::TaskFailed(e.to_string()))?
}

/// POST /api/v0/prices
async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadStats>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    log::info!(
        "Upload received: {} bytes ({})",
        body.len(),
        content_type.as_deref().unwrap_or("no content type")
    );

    let service = state.service.clone();
    let stats =
        run_blocking(move || service.handle_ingest(content_type.as_deref(), &body)).await?;
    Ok(Json(stats))
}

/// GET /api/v0/prices
async fn download_handler(State(state): State<AppState>) -> Result<Response> {
    let service = state.service.clone();
    let export = run_blocking(move || service.handle_export()).await?;

    let headers: [(HeaderName, HeaderValue); 3] = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static(ZIP_CONTENT_TYPE),
        ),
        (
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static(EXPORT_DISPOSITION),
        ),
        (header::CONTENT_LENGTH, HeaderValue::from(export.len())),
    ];
    Ok((headers, export.bytes).into_response())
}

/// GET /api/v0/prices/summary
async fn summary_handler(State(state): State<AppState>) -> Result<Json<StoreSummary>> {
    let service = state.service.clone();
    let summary = run_blocking(move || service.store().summary()).await?;
    Ok(Json(summary))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let service = state.service.clone();
    match run_blocking(move || service.store().ping()).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthStatus {
                status: "ok",
                database: "connected",
            }),
        ),
        Err(e) => {
            log::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthStatus {
                    status: "error",
                    database: "disconnected",
                }),
            )
        }
    }
}

/// Build the web server router
///
/// Uploads larger than `max_body_bytes` are refused with 413 before the
/// pipeline sees them.
pub fn create_router(service: PriceService, max_body_bytes: usize) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/api/v0/prices", get(download_handler).post(upload_handler))
        .route("/api/v0/prices/summary", get(summary_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

/// Start the web server (async), stopping on Ctrl+C
pub async fn serve(
    service: PriceService,
    config: &Config,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let app = create_router(service, config.max_body_bytes());
    let addr = config.listen_addr()?;

    log::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Shutdown signal received"),
        Err(e) => {
            log::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
#[path = "web_tests.rs"]
mod tests;
