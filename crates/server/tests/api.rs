mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{chart_request, executor, json_body, CountingBackend};
use quarry_server::create_router;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

#[tokio::test]
async fn test_chart_data_round_trip() {
    let backend = Arc::new(CountingBackend::default());
    let app = create_router(executor(backend.clone()));

    let response = app
        .clone()
        .oneshot(chart_request("chart-revenue", Some("u-1"), r#"{"filters": []}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-quarry-cache"], "miss");
    assert!(response.headers().contains_key("x-quarry-fingerprint"));

    let body = json_body(response).await;
    assert_eq!(body["columns"], json!(["region", "revenue"]));
    assert_eq!(body["rows"], json!([["EU", 10.5], ["US", 7]]));
    assert_eq!(body["rowCount"], json!(2));
    assert_eq!(body["cache"], json!("miss"));

    let again = app
        .oneshot(chart_request("chart-revenue", Some("u-1"), "{}"))
        .await
        .unwrap();
    assert_eq!(again.headers()["x-quarry-cache"], "hit");
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_missing_identity_is_401() {
    let backend = Arc::new(CountingBackend::default());
    let app = create_router(executor(backend.clone()));

    let response = app
        .oneshot(chart_request("chart-revenue", None, "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], json!("QUARRY-4002"));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_unknown_chart_is_404() {
    let app = create_router(executor(Arc::new(CountingBackend::default())));

    let response = app
        .oneshot(chart_request("chart-missing", Some("u-1"), "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["code"], json!("QUARRY-1005"));
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let app = create_router(executor(Arc::new(CountingBackend::default())));

    let response = app
        .oneshot(chart_request("chart-revenue", Some("u-1"), r#"{"filters": 3}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_row_security_partitions_users() {
    let backend = Arc::new(CountingBackend::default());
    let app = create_router(executor(backend.clone()));

    let open = json_body(
        app.clone()
            .oneshot(chart_request("chart-revenue", Some("u-1"), "{}"))
            .await
            .unwrap(),
    )
    .await;
    let restricted = json_body(
        app.oneshot(chart_request("chart-revenue", Some("u-eu"), "{}"))
            .await
            .unwrap(),
    )
    .await;

    assert_ne!(open["fingerprint"], restricted["fingerprint"]);
    assert_eq!(restricted["cache"], json!("miss"));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_invalidate_cache_entry() {
    let backend = Arc::new(CountingBackend::default());
    let app = create_router(executor(backend.clone()));

    let first = json_body(
        app.clone()
            .oneshot(chart_request("chart-revenue", Some("u-1"), "{}"))
            .await
            .unwrap(),
    )
    .await;
    let fingerprint = first["fingerprint"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/cache/{}", fingerprint))
                .header("x-user-id", "u-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let again = app
        .oneshot(chart_request("chart-revenue", Some("u-1"), "{}"))
        .await
        .unwrap();
    assert_eq!(again.headers()["x-quarry-cache"], "miss");
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_invalid_fingerprint_is_400() {
    let app = create_router(executor(Arc::new(CountingBackend::default())));

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/v1/cache/not-a-fingerprint")
                .header("x-user-id", "u-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_reports_backend_state() {
    let app = create_router(executor(Arc::new(CountingBackend::default())));
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["cache"]["ttlSecs"], json!(60));

    let down = Arc::new(CountingBackend {
        down: true,
        ..Default::default()
    });
    let response = create_router(executor(down))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    quarry_server::metrics::register_all();
    let app = create_router(executor(Arc::new(CountingBackend::default())));
    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
