mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{TestApp, body_bytes, header};
use serde_json::Value;
use tower::ServiceExt;

#[tokio::test]
async fn test_health_reports_staging_and_tools() {
    let app = TestApp::with_config(|config| {
        config.ghostscript_bin = "definitely-not-ghostscript".to_string();
    });

    let response = app
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!header(&response, "x-request-id").is_empty());

    let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["staging"], "available");
    assert_eq!(json["tools"]["ghostscript"], false);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let app = TestApp::new();

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "trace-me-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(header(&response, "x-request-id"), "trace-me-42");
}

#[tokio::test]
async fn test_openapi_lists_conversion_routes() {
    let app = TestApp::new();

    let response = app
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    for path in [
        "/convert/images-to-pdf",
        "/convert/pdf-to-images",
        "/merge",
        "/compress-pdf",
        "/compress-image",
        "/convert/office-to-pdf",
        "/convert/pdf-to-office",
        "/health",
    ] {
        assert!(json["paths"].get(path).is_some(), "{} missing", path);
    }
}
