//! Menu API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{CreateMenuItemRequest, MenuItem, UpdateMenuItemRequest};
use crate::AppState;

/// GET /api/menu - List all menu items.
pub async fn list_menu_items(State(state): State<AppState>) -> ApiResult<Vec<MenuItem>> {
    success(state.repo.list_menu_items().await?)
}

/// GET /api/menu/:id - Get a single menu item.
pub async fn get_menu_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<MenuItem> {
    match state.repo.get_menu_item(id).await? {
        Some(item) => success(item),
        None => Err(AppError::NotFound(format!("Menu item {} not found", id))),
    }
}

/// POST /api/menu - Create a new menu item.
pub async fn create_menu_item(
    State(state): State<AppState>,
    Json(request): Json<CreateMenuItemRequest>,
) -> ApiResult<MenuItem> {
    if request.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if request.price < 0.0 {
        return Err(AppError::Validation(
            "Price must not be negative".to_string(),
        ));
    }

    success(state.repo.create_menu_item(&request).await?)
}

/// PUT /api/menu/:id - Update a menu item.
pub async fn update_menu_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateMenuItemRequest>,
) -> ApiResult<MenuItem> {
    if let Some(price) = request.price {
        if price < 0.0 {
            return Err(AppError::Validation(
                "Price must not be negative".to_string(),
            ));
        }
    }

    success(state.repo.update_menu_item(id, &request).await?)
}

/// DELETE /api/menu/:id - Delete a menu item.
pub async fn delete_menu_item(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<()> {
    state.repo.delete_menu_item(id).await?;
    success(())
}
