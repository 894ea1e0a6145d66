//! Router tests, driven through `tower::ServiceExt::oneshot`

use super::*;
use crate::archive::{make_test_zip, Archive};
use crate::database::{init_schema, PriceStore};
use axum::body::{to_bytes, Body};
use axum::http::Request;
use rusqlite::Connection;
use std::io::Read;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

const SAMPLE_CSV: &str = "name,category,price,create_date\nWidget,Tools,9.99,2024-01-15\n";
const TEST_BODY_LIMIT: usize = 1024 * 1024;

fn create_test_service() -> (PriceService, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let conn = Connection::open(&db_path).unwrap();
    init_schema(&conn).unwrap();
    let store = PriceStore::new(Arc::new(Mutex::new(conn)));
    (PriceService::new(store), temp_dir)
}

fn upload_request(content_type: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v0/prices")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn upload_returns_stats() {
    let (service, _dir) = create_test_service();
    let router = create_router(service, TEST_BODY_LIMIT);

    let zip = make_test_zip(&[("data.csv", SAMPLE_CSV)]);
    let (status, _, body) = send(router, upload_request("application/zip", zip)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json(&body),
        serde_json::json!({"total_items": 1, "total_categories": 1, "total_price": 9.99})
    );
}

#[tokio::test]
async fn upload_with_wrong_content_type_is_bad_request() {
    let (service, _dir) = create_test_service();
    let router = create_router(service, TEST_BODY_LIMIT);

    let (status, _, body) = send(
        router,
        upload_request("text/csv", SAMPLE_CSV.as_bytes().to_vec()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "Expected zip file, got: text/csv");
}

#[tokio::test]
async fn upload_with_empty_body_is_bad_request() {
    let (service, _dir) = create_test_service();
    let router = create_router(service, TEST_BODY_LIMIT);

    let (status, _, body) = send(router, upload_request("application/zip", Vec::new())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"], "Empty request body");
}

#[tokio::test]
async fn upload_with_bad_row_is_bad_request_and_stores_nothing() {
    let (service, _dir) = create_test_service();
    let router = create_router(service.clone(), TEST_BODY_LIMIT);

    let zip = make_test_zip(&[(
        "data.csv",
        "name,category,price,create_date\nWidget,Tools,bad,2024-01-15\n",
    )]);
    let (status, _, body) = send(router, upload_request("application/zip", zip)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = json(&body)["error"].as_str().unwrap().to_string();
    assert!(error.contains("line 2"), "unexpected error: {}", error);
    assert_eq!(service.store().count().unwrap(), 0);
}

#[tokio::test]
async fn upload_over_limit_is_rejected() {
    let (service, _dir) = create_test_service();
    let router = create_router(service, 16);

    let zip = make_test_zip(&[("data.csv", SAMPLE_CSV)]);
    let (status, _, _) = send(router, upload_request("application/zip", zip)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn upload_that_inflates_past_csv_limit_is_bad_request() {
    let (service, _dir) = create_test_service();
    let service = service.with_max_csv_bytes(64 * 1024);
    let router = create_router(service.clone(), TEST_BODY_LIMIT);

    // Compresses to a few KiB, well under the body limit
    let csv = "Hammer,Tools,1.00,2024-01-01\n".repeat(10_000);
    let zip = make_test_zip(&[("data.csv", csv.as_str())]);
    assert!(zip.len() < TEST_BODY_LIMIT);

    let (status, _, body) = send(router, upload_request("application/zip", zip)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json(&body)["error"],
        "CSV file exceeds 65536 bytes uncompressed"
    );
    assert_eq!(service.store().count().unwrap(), 0);
}

#[tokio::test]
async fn download_returns_zip_with_headers() {
    let (service, _dir) = create_test_service();
    let zip = make_test_zip(&[("data.csv", SAMPLE_CSV)]);
    service
        .handle_ingest(Some("application/zip"), &zip)
        .unwrap();

    let router = create_router(service, TEST_BODY_LIMIT);
    let (status, headers, body) = send(router, get_request("/api/v0/prices")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"prices.zip\""
    );
    assert_eq!(
        headers[header::CONTENT_LENGTH],
        body.len().to_string().as_str()
    );

    let mut archive = Archive::unpack(&body).unwrap();
    let mut csv = String::new();
    archive
        .open("data.csv")
        .unwrap()
        .read_to_string(&mut csv)
        .unwrap();
    assert_eq!(csv, SAMPLE_CSV);
}

#[tokio::test]
async fn summary_reports_store_totals() {
    let (service, _dir) = create_test_service();
    for _ in 0..2 {
        let zip = make_test_zip(&[("data.csv", SAMPLE_CSV)]);
        service
            .handle_ingest(Some("application/zip"), &zip)
            .unwrap();
    }

    let router = create_router(service, TEST_BODY_LIMIT);
    let (status, _, body) = send(router, get_request("/api/v0/prices/summary")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json(&body),
        serde_json::json!({"total_items": 2, "total_categories": 1, "total_price": 19.98})
    );
}

#[tokio::test]
async fn health_reports_connected() {
    let (service, _dir) = create_test_service();
    let router = create_router(service, TEST_BODY_LIMIT);

    let (status, _, body) = send(router, get_request("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json(&body),
        serde_json::json!({"status": "ok", "database": "connected"})
    );
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (service, _dir) = create_test_service();
    let router = create_router(service, TEST_BODY_LIMIT);

    let (status, _, _) = send(router, get_request("/api/v1/prices")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[test]
fn storage_errors_map_to_internal_server_error() {
    let response = PriceError::Storage(rusqlite::Error::InvalidQuery).into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn client_errors_map_to_bad_request() {
    let response = PriceError::NoRecords.into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn error_body_serialization() {
    let body = ErrorBody {
        error: "Test error".to_string(),
    };
    let json = serde_json::to_string(&body).unwrap();
    assert_eq!(json, r#"{"error":"Test error"}"#);
}
