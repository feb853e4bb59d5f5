//! Dining table API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{CreateTableRequest, DiningTable, UpdateTableRequest};
use crate::AppState;

/// GET /api/tables - List all dining tables.
pub async fn list_tables(State(state): State<AppState>) -> ApiResult<Vec<DiningTable>> {
    success(state.repo.list_tables().await?)
}

/// GET /api/tables/:id - Get a single dining table.
pub async fn get_table(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<DiningTable> {
    match state.repo.get_table(id).await? {
        Some(table) => success(table),
        None => Err(AppError::NotFound(format!("Table {} not found", id))),
    }
}

/// POST /api/tables - Create a new dining table.
pub async fn create_table(
    State(state): State<AppState>,
    Json(request): Json<CreateTableRequest>,
) -> ApiResult<DiningTable> {
    if request.label.trim().is_empty() {
        return Err(AppError::Validation("Label is required".to_string()));
    }
    if request.seats <= 0 {
        return Err(AppError::Validation(
            "Seat count must be positive".to_string(),
        ));
    }

    success(state.repo.create_table(&request).await?)
}

/// PUT /api/tables/:id - Update a dining table.
pub async fn update_table(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateTableRequest>,
) -> ApiResult<DiningTable> {
    success(state.repo.update_table(id, &request).await?)
}

/// DELETE /api/tables/:id - Delete a dining table.
pub async fn delete_table(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<()> {
    state.repo.delete_table(id).await?;
    success(())
}
