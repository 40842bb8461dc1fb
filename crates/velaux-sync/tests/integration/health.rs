/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use velaux_sync::health::{configure_health_routes, HealthState};
use velaux_sync::metrics;
use tower::ServiceExt;

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_healthz_endpoint() {
    let app = configure_health_routes(HealthState::default());
    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_readyz_follows_the_ready_flag() {
    let state = HealthState::default();
    let app = configure_health_routes(state.clone());

    let (status, body) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "Not ready");

    state.set_ready(true);
    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Ready");
}

#[tokio::test]
async fn test_health_endpoint_reports_json() {
    let state = HealthState::default();
    let app = configure_health_routes(state.clone());

    let (status, body) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "starting");

    state.set_ready(true);
    let (status, body) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["ready"], true);
    assert!(health["uptime_seconds"].is_u64());
    assert!(health["version"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    metrics::sync_cache_entries().set(3.0);
    let app = configure_health_routes(HealthState::default());
    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("velaux_sync_cache_entries"));
}
