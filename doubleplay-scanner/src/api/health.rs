//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::scan::ScanActivity;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" while the upstream is unhealthy
    pub status: String,
    /// Module name ("doubleplay-scanner")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub upstream_healthy: bool,
    pub upstream_failures: u32,
    pub activity: ScanActivity,
    pub running: bool,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let upstream = state.queue.upstream_health();
    let scan = state.queue.state_snapshot().await;

    let status = if upstream.healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        module: "doubleplay-scanner".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        upstream_healthy: upstream.healthy,
        upstream_failures: upstream.consecutive_failures,
        activity: scan.activity,
        running: scan.running,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
