//! Gastro Backend
//!
//! A production-grade restaurant management REST backend with SQLite
//! persistence and an atomic snapshot export/restore engine.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod snapshot;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
    /// Serializes restore attempts; the store supports exactly one at a time.
    pub restore_lock: Arc<Mutex<()>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Gastro Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (GASTRO_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    // Create application state
    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
        restore_lock: Arc::new(Mutex::new(())),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        // Menu
        .route("/menu", get(api::list_menu_items))
        .route("/menu", post(api::create_menu_item))
        .route("/menu/{id}", get(api::get_menu_item))
        .route("/menu/{id}", put(api::update_menu_item))
        .route("/menu/{id}", delete(api::delete_menu_item))
        // Dining tables
        .route("/tables", get(api::list_tables))
        .route("/tables", post(api::create_table))
        .route("/tables/{id}", get(api::get_table))
        .route("/tables/{id}", put(api::update_table))
        .route("/tables/{id}", delete(api::delete_table))
        // Orders
        .route("/orders", get(api::list_orders))
        .route("/orders", post(api::create_order))
        .route("/orders/{id}", get(api::get_order))
        .route("/orders/{id}/status", put(api::update_order_status))
        // Snapshot
        .route("/snapshot/export", get(api::export_snapshot))
        .route("/snapshot/restore", post(api::restore_snapshot))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
