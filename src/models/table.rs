//! Dining table models.

use serde::{Deserialize, Serialize};

/// A physical table in the restaurant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiningTable {
    pub id: i64,
    pub label: String,
    pub seats: i64,
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTableRequest {
    pub label: String,
    pub seats: i64,
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTableRequest {
    pub label: Option<String>,
    pub seats: Option<i64>,
    pub zone: Option<String>,
}
