//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for all operational data. Foreign keys are
//! enforced on every connection; all identifier columns that participate in
//! the snapshot engine use AUTOINCREMENT so generator state lives in
//! `sqlite_sequence` and can be reset and resynchronized explicitly.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Master data roots
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            name TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS roles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS permissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS role_permissions (
            role_id INTEGER NOT NULL REFERENCES roles(id),
            permission_id INTEGER NOT NULL REFERENCES permissions(id),
            PRIMARY KEY (role_id, permission_id)
        );

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            role_id INTEGER NOT NULL REFERENCES roles(id),
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS memberships (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_name TEXT NOT NULL,
            card_code TEXT NOT NULL UNIQUE,
            points INTEGER NOT NULL DEFAULT 0,
            joined_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dining_tables (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL UNIQUE,
            seats INTEGER NOT NULL,
            zone TEXT
        );

        CREATE TABLE IF NOT EXISTS menu_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            category TEXT NOT NULL,
            price REAL NOT NULL,
            vat_rate REAL NOT NULL DEFAULT 0.19,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Transactional data
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_id INTEGER NOT NULL REFERENCES dining_tables(id),
            user_id INTEGER NOT NULL REFERENCES users(id),
            membership_id INTEGER REFERENCES memberships(id),
            status TEXT NOT NULL DEFAULT 'open',
            opened_at TEXT NOT NULL,
            closed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS order_lines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id INTEGER NOT NULL REFERENCES orders(id),
            menu_item_id INTEGER NOT NULL REFERENCES menu_items(id),
            quantity INTEGER NOT NULL,
            unit_price REAL NOT NULL,
            note TEXT
        );

        CREATE TABLE IF NOT EXISTS invoices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id INTEGER NOT NULL REFERENCES orders(id),
            number TEXT NOT NULL UNIQUE,
            issued_at TEXT NOT NULL,
            total REAL NOT NULL,
            vat_total REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS invoice_lines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_id INTEGER NOT NULL REFERENCES invoices(id),
            description TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            unit_price REAL NOT NULL,
            vat_rate REAL NOT NULL
        );

        CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id INTEGER NOT NULL REFERENCES orders(id),
            invoice_id INTEGER REFERENCES invoices(id),
            method TEXT NOT NULL,
            amount REAL NOT NULL,
            paid_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Notifications and audit trail
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            body TEXT,
            severity TEXT NOT NULL DEFAULT 'info',
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS notification_statuses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            notification_id INTEGER NOT NULL REFERENCES notifications(id),
            user_id INTEGER NOT NULL REFERENCES users(id),
            read_at TEXT
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER REFERENCES users(id),
            action TEXT NOT NULL,
            detail TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
        CREATE INDEX IF NOT EXISTS idx_order_lines_order ON order_lines(order_id);
        CREATE INDEX IF NOT EXISTS idx_invoices_order ON invoices(order_id);
        CREATE INDEX IF NOT EXISTS idx_payments_order ON payments(order_id);
        CREATE INDEX IF NOT EXISTS idx_notification_statuses_user ON notification_statuses(user_id);
        CREATE INDEX IF NOT EXISTS idx_audit_log_action ON audit_log(action);
        "#,
    )
    .execute(pool)
    .await?;

    seed_master_data(pool).await?;

    Ok(())
}

/// Seed the master data a fresh installation needs to take orders.
async fn seed_master_data(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO settings (name, value, updated_at) VALUES
            ('restaurant.name', 'Unnamed Restaurant', datetime('now')),
            ('restaurant.currency', 'EUR', datetime('now'));

        INSERT OR IGNORE INTO roles (id, name) VALUES
            (1, 'admin'),
            (2, 'waiter'),
            (3, 'kitchen');

        INSERT OR IGNORE INTO permissions (id, code, description) VALUES
            (1, 'orders.manage', 'Create and update orders'),
            (2, 'menu.manage', 'Maintain the menu'),
            (3, 'snapshot.manage', 'Export and restore snapshots');

        INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES
            (1, 1), (1, 2), (1, 3),
            (2, 1);

        INSERT OR IGNORE INTO users (id, username, display_name, role_id, active, created_at)
        VALUES (1, 'admin', 'Administrator', 1, 1, datetime('now'));
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
