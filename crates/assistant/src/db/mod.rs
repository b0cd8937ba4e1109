//! Data store for the catalog and orders.
//!
//! # Database: `skin_edit`
//!
//! ## Tables
//!
//! - `products` - Catalog (read-mostly; stock is decremented on order placement)
//! - `orders` - Order headers keyed by an 8-character code
//! - `order_items` - Order lines with name and unit price snapshots
//!
//! # Migrations
//!
//! Migrations are stored in `crates/assistant/migrations/` and run via:
//! ```bash
//! cargo run -p skin-edit-cli -- migrate
//! ```
//!
//! The chat core only sees the [`CommerceStore`] trait. [`PgStore`] backs the
//! server; [`InMemoryStore`] backs tests and local experiments.

pub mod memory;
pub mod orders;
pub mod products;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Serialize;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use skin_edit_core::{OrderId, OrderStatus, ProductId};

use crate::models::{
    CatalogEntry, NewOrder, OrderDetail, OrderSummary, Product, SearchPage, SearchQuery,
};

pub use memory::InMemoryStore;
pub use orders::OrderRepository;
pub use products::ProductRepository;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., order id exhausted).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Why a cart line cannot be ordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockProblem {
    /// The product no longer exists.
    Missing,
    /// No units left.
    SoldOut,
    /// Fewer units than requested.
    Insufficient { available: u32 },
}

/// A cart line that failed the stock re-check at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockIssue {
    pub sku: String,
    pub name: String,
    pub requested: u32,
    #[serde(flatten)]
    pub problem: StockProblem,
}

impl std::fmt::Display for StockIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.problem {
            StockProblem::Missing => write!(f, "{} is no longer available.", self.name),
            StockProblem::SoldOut => write!(f, "{} is out of stock.", self.name),
            StockProblem::Insufficient { available } => write!(
                f,
                "Only {available} units of {} available (you asked for {}).",
                self.name, self.requested
            ),
        }
    }
}

/// Result of an order placement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceOrderOutcome {
    /// Order stored and stock decremented.
    Placed(OrderDetail),
    /// Nothing was written.
    Rejected(Vec<StockIssue>),
}

/// Result of an order status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Updated {
        previous: OrderStatus,
        current: OrderStatus,
    },
    /// The order was already rejected; nothing changed.
    AlreadyRejected,
    NotFound,
}

/// Everything the assistant needs from the data store.
///
/// `place_order` and `update_order_status` are atomic: either every line and
/// stock change is applied or none is.
#[async_trait]
pub trait CommerceStore: Send + Sync {
    async fn product_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError>;

    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// One page of products matching the filters, most popular first.
    async fn search_products(&self, query: &SearchQuery) -> Result<SearchPage, RepositoryError>;

    /// Every product, ordered by category then name.
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError>;

    /// Compact catalog listing for the system prompt.
    async fn catalog_overview(&self) -> Result<Vec<CatalogEntry>, RepositoryError> {
        Ok(self
            .list_products()
            .await?
            .iter()
            .map(CatalogEntry::from)
            .collect())
    }

    /// Re-check stock, then create the order and decrement stock.
    async fn place_order(&self, order: &NewOrder) -> Result<PlaceOrderOutcome, RepositoryError>;

    async fn order_with_items(&self, id: &OrderId) -> Result<Option<OrderDetail>, RepositoryError>;

    /// Move an order to `status`, restoring stock when it becomes rejected.
    async fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<StatusChange, RepositoryError>;

    /// Orders whose customer name, phone or id contain `search`, newest first.
    async fn search_orders(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<OrderSummary>, RepositoryError>;

    /// Round-trip to the backing store, for readiness checks.
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// `PostgreSQL`-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CommerceStore for PgStore {
    async fn product_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).get_by_sku(sku).await
    }

    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).get_by_id(id).await
    }

    async fn search_products(&self, query: &SearchQuery) -> Result<SearchPage, RepositoryError> {
        ProductRepository::new(&self.pool).search(query).await
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).list().await
    }

    async fn place_order(&self, order: &NewOrder) -> Result<PlaceOrderOutcome, RepositoryError> {
        OrderRepository::new(&self.pool).place(order).await
    }

    async fn order_with_items(&self, id: &OrderId) -> Result<Option<OrderDetail>, RepositoryError> {
        OrderRepository::new(&self.pool).get_with_items(id).await
    }

    async fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<StatusChange, RepositoryError> {
        OrderRepository::new(&self.pool).update_status(id, status).await
    }

    async fn search_orders(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<OrderSummary>, RepositoryError> {
        OrderRepository::new(&self.pool).search(search).await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Escape `%`, `_` and `\` so user text is matched literally inside `ILIKE`.
pub(crate) fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
