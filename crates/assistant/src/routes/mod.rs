//! HTTP route handlers for the assistant.
//!
//! # Route Structure
//!
//! ```text
//! GET   /health                    - Liveness check
//! GET   /health/ready              - Readiness check (data store round-trip)
//!
//! # Chat
//! GET   /ws/chat                   - Websocket chat connection
//! GET   /api/sessions              - Live chat session counts
//!
//! # Catalog
//! GET   /api/products              - Every product
//! GET   /api/categories            - Distinct categories
//! GET   /api/skin-types            - Distinct skin types
//!
//! # Orders
//! GET   /api/orders?search=        - Order listing, newest first
//! GET   /api/orders/{id}           - Order detail with line totals
//! PATCH /api/orders/{id}/status    - Change status (rejecting restores stock)
//! ```

pub mod catalog;
pub mod health;
pub mod orders;
pub mod ws;

use axum::{
    Router,
    routing::{get, patch},
};

use crate::state::AppState;

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{id}", get(orders::show))
        .route("/{id}/status", patch(orders::update_status))
}

/// Create the JSON API router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(catalog::products))
        .route("/categories", get(catalog::categories))
        .route("/skin-types", get(catalog::skin_types))
        .route("/sessions", get(health::sessions))
        .nest("/orders", order_routes())
}

/// Create all routes for the assistant.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/ws/chat", get(ws::chat))
        .nest("/api", api_routes())
}
