//! Read-only scan status and dataset endpoints

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use doubleplay_common::{DatasetWindow, ScanDirection};

use crate::error::{ApiError, ApiResult};
use crate::scan::{ProgressReport, ScanState};
use crate::AppState;

/// GET /scan/state
pub async fn scan_state(State(state): State<AppState>) -> Json<ScanState> {
    Json(state.queue.state_snapshot().await)
}

/// GET /scan/progress
pub async fn scan_progress(State(state): State<AppState>) -> Json<Vec<ProgressReport>> {
    Json(state.queue.progress().await)
}

/// GET /scan/progress/:direction
///
/// 404 for an unknown direction or one that has not been scanned yet.
pub async fn scan_progress_for(
    State(state): State<AppState>,
    Path(direction): Path<String>,
) -> ApiResult<Json<ProgressReport>> {
    let direction = match direction.as_str() {
        "forward" => ScanDirection::Forward,
        "backward" => ScanDirection::Backward,
        other => return Err(ApiError::NotFound(format!("scan direction '{}'", other))),
    };

    state
        .queue
        .progress()
        .await
        .into_iter()
        .find(|report| report.direction == direction)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no {} scan in this run", direction)))
}

/// GET /double-plays
pub async fn double_plays(State(state): State<AppState>) -> Json<DatasetWindow> {
    Json(state.queue.dataset_snapshot().await)
}

pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/scan/state", get(scan_state))
        .route("/scan/progress", get(scan_progress))
        .route("/scan/progress/:direction", get(scan_progress_for))
        .route("/double-plays", get(double_plays))
}
