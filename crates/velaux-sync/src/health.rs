/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Health Check Module
//!
//! HTTP endpoints for liveness, readiness and metrics scraping.
//!
//! ## Endpoints
//!
//! - `GET /healthz`: liveness, 200 while the process runs
//! - `GET /readyz`: 200 once the sync cache is seeded and the workers run
//! - `GET /health`: JSON status with uptime and version
//! - `GET /metrics`: Prometheus text exposition

use crate::metrics;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Shared state for health endpoints
#[derive(Clone)]
pub struct HealthState {
    pub ready: Arc<AtomicBool>,
    pub start_time: SystemTime,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            start_time: SystemTime::now(),
        }
    }
}

impl HealthState {
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[derive(Serialize)]
struct HealthStatus {
    status: String,
    ready: bool,
    uptime_seconds: u64,
    version: String,
    timestamp: String,
}

/// Configures and returns the health check router
pub fn configure_health_routes(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readyz(State(state): State<HealthState>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
    }
}

async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    let ready = state.is_ready();
    let uptime_seconds = state
        .start_time
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let body = HealthStatus {
        status: if ready { "healthy" } else { "starting" }.to_string(),
        ready,
        uptime_seconds,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

/// Prometheus metrics endpoint
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}
