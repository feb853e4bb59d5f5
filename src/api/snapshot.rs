//! Snapshot trigger endpoints: export download and destructive restore.

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderMap},
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;

use super::{success, ApiResult};
use crate::auth::require_actor;
use crate::errors::AppError;
use crate::snapshot::{self, RestoreSummary};
use crate::AppState;

/// GET /api/snapshot/export - Download a full snapshot archive.
pub async fn export_snapshot(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let actor = require_actor(&headers)?;
    let bytes = snapshot::export(state.repo.pool(), &actor).await?;

    let filename = format!(
        "restaurant-snapshot-{}.zip",
        Utc::now().format("%Y%m%d-%H%M%S")
    );

    Response::builder()
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(format!("Failed to build export response: {}", e)))
}

#[derive(Debug, Deserialize)]
pub struct RestoreParams {
    #[serde(default)]
    pub confirm: bool,
}

/// POST /api/snapshot/restore?confirm=true - Destructively restore from an
/// uploaded snapshot archive.
pub async fn restore_snapshot(
    State(state): State<AppState>,
    Query(params): Query<RestoreParams>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<RestoreSummary> {
    // The confirmation flag is checked before anything else, including
    // identity resolution and archive validation.
    if !params.confirm {
        return Err(AppError::ConfirmationRequired(
            "Restore replaces all data; repeat the request with confirm=true".to_string(),
        ));
    }

    let actor = require_actor(&headers)?;

    // One restore at a time; a concurrent attempt waits its turn and then
    // operates on the already-restored store.
    let _guard = state.restore_lock.lock().await;
    let summary = snapshot::restore(state.repo.pool(), &body, &actor).await?;

    success(summary)
}
