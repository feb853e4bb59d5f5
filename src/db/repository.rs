//! Database repository for CRUD operations.
//!
//! Uses prepared statements and transactions for data integrity. The snapshot
//! engine does not go through these methods; it reads and writes tables
//! generically via the dataset registry.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    CreateMenuItemRequest, CreateOrderRequest, CreateTableRequest, DiningTable, MenuItem, Order,
    OrderLine, OrderStatus, UpdateMenuItemRequest, UpdateOrderStatusRequest, UpdateTableRequest,
};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool, used by the snapshot engine.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ==================== MENU OPERATIONS ====================

    /// List all menu items.
    pub async fn list_menu_items(&self) -> Result<Vec<MenuItem>, AppError> {
        let rows = sqlx::query(
            "SELECT id, name, category, price, vat_rate, active, created_at FROM menu_items ORDER BY category, name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(menu_item_from_row).collect())
    }

    /// Get a menu item by ID.
    pub async fn get_menu_item(&self, id: i64) -> Result<Option<MenuItem>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, category, price, vat_rate, active, created_at FROM menu_items WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(menu_item_from_row))
    }

    /// Create a new menu item.
    pub async fn create_menu_item(
        &self,
        request: &CreateMenuItemRequest,
    ) -> Result<MenuItem, AppError> {
        let now = Utc::now().to_rfc3339();
        let vat_rate = request.vat_rate.unwrap_or(0.19);

        let result = sqlx::query(
            "INSERT INTO menu_items (name, category, price, vat_rate, active, created_at) VALUES (?, ?, ?, ?, 1, ?)",
        )
        .bind(&request.name)
        .bind(&request.category)
        .bind(request.price)
        .bind(vat_rate)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(MenuItem {
            id: result.last_insert_rowid(),
            name: request.name.clone(),
            category: request.category.clone(),
            price: request.price,
            vat_rate,
            active: true,
            created_at: now,
        })
    }

    /// Update a menu item.
    pub async fn update_menu_item(
        &self,
        id: i64,
        request: &UpdateMenuItemRequest,
    ) -> Result<MenuItem, AppError> {
        let existing = self
            .get_menu_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Menu item {} not found", id)))?;

        let name = request.name.as_ref().unwrap_or(&existing.name);
        let category = request.category.as_ref().unwrap_or(&existing.category);
        let price = request.price.unwrap_or(existing.price);
        let vat_rate = request.vat_rate.unwrap_or(existing.vat_rate);
        let active = request.active.unwrap_or(existing.active);

        sqlx::query(
            "UPDATE menu_items SET name = ?, category = ?, price = ?, vat_rate = ?, active = ? WHERE id = ?",
        )
        .bind(name)
        .bind(category)
        .bind(price)
        .bind(vat_rate)
        .bind(active as i32)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(MenuItem {
            id,
            name: name.clone(),
            category: category.clone(),
            price,
            vat_rate,
            active,
            created_at: existing.created_at,
        })
    }

    /// Delete a menu item.
    pub async fn delete_menu_item(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM menu_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Menu item {} not found", id)));
        }

        Ok(())
    }

    // ==================== TABLE OPERATIONS ====================

    /// List all dining tables.
    pub async fn list_tables(&self) -> Result<Vec<DiningTable>, AppError> {
        let rows = sqlx::query("SELECT id, label, seats, zone FROM dining_tables ORDER BY label")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(table_from_row).collect())
    }

    /// Get a dining table by ID.
    pub async fn get_table(&self, id: i64) -> Result<Option<DiningTable>, AppError> {
        let row = sqlx::query("SELECT id, label, seats, zone FROM dining_tables WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(table_from_row))
    }

    /// Create a new dining table.
    pub async fn create_table(&self, request: &CreateTableRequest) -> Result<DiningTable, AppError> {
        let result = sqlx::query("INSERT INTO dining_tables (label, seats, zone) VALUES (?, ?, ?)")
            .bind(&request.label)
            .bind(request.seats)
            .bind(&request.zone)
            .execute(&self.pool)
            .await?;

        Ok(DiningTable {
            id: result.last_insert_rowid(),
            label: request.label.clone(),
            seats: request.seats,
            zone: request.zone.clone(),
        })
    }

    /// Update a dining table.
    pub async fn update_table(
        &self,
        id: i64,
        request: &UpdateTableRequest,
    ) -> Result<DiningTable, AppError> {
        let existing = self
            .get_table(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Table {} not found", id)))?;

        let label = request.label.as_ref().unwrap_or(&existing.label);
        let seats = request.seats.unwrap_or(existing.seats);
        let zone = request.zone.clone().or(existing.zone.clone());

        sqlx::query("UPDATE dining_tables SET label = ?, seats = ?, zone = ? WHERE id = ?")
            .bind(label)
            .bind(seats)
            .bind(&zone)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(DiningTable {
            id,
            label: label.clone(),
            seats,
            zone,
        })
    }

    /// Delete a dining table.
    pub async fn delete_table(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM dining_tables WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Table {} not found", id)));
        }

        Ok(())
    }

    // ==================== ORDER OPERATIONS ====================

    /// List orders, optionally filtered by status.
    pub async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, AppError> {
        let rows = match status {
            Some(s) => {
                sqlx::query(
                    "SELECT id, table_id, user_id, membership_id, status, opened_at, closed_at FROM orders WHERE status = ? ORDER BY id",
                )
                .bind(s.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, table_id, user_id, membership_id, status, opened_at, closed_at FROM orders ORDER BY id",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut order = order_from_row(row)?;
            order.lines = self.list_order_lines(order.id).await?;
            orders.push(order);
        }

        Ok(orders)
    }

    /// Get an order with its lines.
    pub async fn get_order(&self, id: i64) -> Result<Option<Order>, AppError> {
        let row = sqlx::query(
            "SELECT id, table_id, user_id, membership_id, status, opened_at, closed_at FROM orders WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut order = order_from_row(&row)?;
        order.lines = self.list_order_lines(order.id).await?;
        Ok(Some(order))
    }

    async fn list_order_lines(&self, order_id: i64) -> Result<Vec<OrderLine>, AppError> {
        let rows = sqlx::query(
            "SELECT id, order_id, menu_item_id, quantity, unit_price, note FROM order_lines WHERE order_id = ? ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(order_line_from_row).collect())
    }

    /// Create a new order with its lines in one transaction.
    ///
    /// Unit prices are captured from the menu at order time so later menu
    /// edits never rewrite history.
    pub async fn create_order(&self, request: &CreateOrderRequest) -> Result<Order, AppError> {
        if request.lines.is_empty() {
            return Err(AppError::Validation(
                "An order needs at least one line".to_string(),
            ));
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let table = sqlx::query("SELECT id FROM dining_tables WHERE id = ?")
            .bind(request.table_id)
            .fetch_optional(&mut *tx)
            .await?;
        if table.is_none() {
            return Err(AppError::Validation(format!(
                "Table {} does not exist",
                request.table_id
            )));
        }

        let user = sqlx::query("SELECT id FROM users WHERE id = ?")
            .bind(request.user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if user.is_none() {
            return Err(AppError::Validation(format!(
                "User {} does not exist",
                request.user_id
            )));
        }

        let result = sqlx::query(
            "INSERT INTO orders (table_id, user_id, membership_id, status, opened_at) VALUES (?, ?, ?, 'open', ?)",
        )
        .bind(request.table_id)
        .bind(request.user_id)
        .bind(request.membership_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        let order_id = result.last_insert_rowid();

        let mut lines = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            if line.quantity <= 0 {
                return Err(AppError::Validation(
                    "Line quantity must be positive".to_string(),
                ));
            }

            let item = sqlx::query("SELECT price, active FROM menu_items WHERE id = ?")
                .bind(line.menu_item_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    AppError::Validation(format!("Menu item {} does not exist", line.menu_item_id))
                })?;

            let active: i64 = item.get("active");
            if active == 0 {
                return Err(AppError::Validation(format!(
                    "Menu item {} is not available",
                    line.menu_item_id
                )));
            }
            let unit_price: f64 = item.get("price");

            let line_result = sqlx::query(
                "INSERT INTO order_lines (order_id, menu_item_id, quantity, unit_price, note) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(line.menu_item_id)
            .bind(line.quantity)
            .bind(unit_price)
            .bind(&line.note)
            .execute(&mut *tx)
            .await?;

            lines.push(OrderLine {
                id: line_result.last_insert_rowid(),
                order_id,
                menu_item_id: line.menu_item_id,
                quantity: line.quantity,
                unit_price,
                note: line.note.clone(),
            });
        }

        tx.commit().await?;

        Ok(Order {
            id: order_id,
            table_id: request.table_id,
            user_id: request.user_id,
            membership_id: request.membership_id,
            status: OrderStatus::Open,
            opened_at: now,
            closed_at: None,
            lines,
        })
    }

    /// Transition an order to a new status. Finalized orders are immutable.
    pub async fn update_order_status(
        &self,
        id: i64,
        request: &UpdateOrderStatusRequest,
    ) -> Result<Order, AppError> {
        let target = OrderStatus::from_str(&request.status).ok_or_else(|| {
            AppError::Validation(format!("Unknown order status '{}'", request.status))
        })?;

        let existing = self
            .get_order(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))?;

        if existing.status.is_final() {
            return Err(AppError::Validation(format!(
                "Order {} is already {}",
                id,
                existing.status.as_str()
            )));
        }

        let closed_at = if target.is_final() {
            Some(Utc::now().to_rfc3339())
        } else {
            None
        };

        sqlx::query("UPDATE orders SET status = ?, closed_at = ? WHERE id = ?")
            .bind(target.as_str())
            .bind(&closed_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(Order {
            status: target,
            closed_at,
            ..existing
        })
    }

}

// Helper functions for row conversion

fn menu_item_from_row(row: &sqlx::sqlite::SqliteRow) -> MenuItem {
    let active: i64 = row.get("active");
    MenuItem {
        id: row.get("id"),
        name: row.get("name"),
        category: row.get("category"),
        price: row.get("price"),
        vat_rate: row.get("vat_rate"),
        active: active != 0,
        created_at: row.get("created_at"),
    }
}

fn table_from_row(row: &sqlx::sqlite::SqliteRow) -> DiningTable {
    DiningTable {
        id: row.get("id"),
        label: row.get("label"),
        seats: row.get("seats"),
        zone: row.get("zone"),
    }
}

fn order_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Order, AppError> {
    let status_str: String = row.get("status");
    let status = OrderStatus::from_str(&status_str)
        .ok_or_else(|| AppError::Internal(format!("Invalid order status '{}'", status_str)))?;

    Ok(Order {
        id: row.get("id"),
        table_id: row.get("table_id"),
        user_id: row.get("user_id"),
        membership_id: row.get("membership_id"),
        status,
        opened_at: row.get("opened_at"),
        closed_at: row.get("closed_at"),
        lines: Vec::new(),
    })
}

fn order_line_from_row(row: &sqlx::sqlite::SqliteRow) -> OrderLine {
    OrderLine {
        id: row.get("id"),
        order_id: row.get("order_id"),
        menu_item_id: row.get("menu_item_id"),
        quantity: row.get("quantity"),
        unit_price: row.get("unit_price"),
        note: row.get("note"),
    }
}
