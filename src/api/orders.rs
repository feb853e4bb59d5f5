//! Order API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{CreateOrderRequest, Order, OrderStatus, UpdateOrderStatusRequest};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    pub status: Option<String>,
}

/// GET /api/orders - List orders, optionally filtered by status.
pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<ListOrdersParams>,
) -> ApiResult<Vec<Order>> {
    let status = match params.status.as_deref() {
        Some(s) => Some(OrderStatus::from_str(s).ok_or_else(|| {
            AppError::Validation(format!("Unknown order status '{}'", s))
        })?),
        None => None,
    };

    success(state.repo.list_orders(status).await?)
}

/// GET /api/orders/:id - Get a single order with its lines.
pub async fn get_order(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Order> {
    match state.repo.get_order(id).await? {
        Some(order) => success(order),
        None => Err(AppError::NotFound(format!("Order {} not found", id))),
    }
}

/// POST /api/orders - Create a new order.
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<Order> {
    success(state.repo.create_order(&request).await?)
}

/// PUT /api/orders/:id/status - Transition an order to a new status.
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> ApiResult<Order> {
    success(state.repo.update_order_status(id, &request).await?)
}
