//! doubleplay-scanner library interface
//!
//! Exposes the detection engine, scan queue and collaborators for the binary
//! and for integration testing.

pub mod api;
pub mod config;
pub mod detection;
pub mod error;
pub mod scan;
pub mod services;

pub use crate::error::{ApiError, ApiResult, ScanError, ScanResult, UpstreamError};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::scan::ScanQueue;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<ScanQueue>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(queue: Arc<ScanQueue>) -> Self {
        Self {
            queue,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::scan_routes())
        .with_state(state)
}
