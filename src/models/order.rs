//! Order and order line models.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an order.
///
/// `Paid` and `Cancelled` are terminal; everything else counts as an open
/// order and blocks a destructive snapshot restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Preparing,
    Served,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "open",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Served => "served",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(OrderStatus::Open),
            "preparing" => Some(OrderStatus::Preparing),
            "served" => Some(OrderStatus::Served),
            "paid" => Some(OrderStatus::Paid),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether the order has reached a terminal state.
    pub fn is_final(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
    }
}

/// A guest order with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub table_id: i64,
    pub user_id: i64,
    pub membership_id: Option<i64>,
    pub status: OrderStatus,
    pub opened_at: String,
    pub closed_at: Option<String>,
    pub lines: Vec<OrderLine>,
}

/// One ordered position; unit price is captured from the menu at order time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub menu_item_id: i64,
    pub quantity: i64,
    pub unit_price: f64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub table_id: i64,
    pub user_id: i64,
    pub membership_id: Option<i64>,
    pub lines: Vec<CreateOrderLineRequest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderLineRequest {
    pub menu_item_id: i64,
    pub quantity: i64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}
