//! Database operations for orders.
//!
//! Placement and status changes run in a single transaction and lock the
//! affected `products` rows, so concurrent checkouts cannot oversell and a
//! rejected order restores stock exactly once.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use skin_edit_core::{OrderId, OrderStatus, Price, ProductId};

use super::{PlaceOrderOutcome, RepositoryError, StatusChange, StockIssue, StockProblem, like_pattern};
use crate::models::{NewOrder, Order, OrderDetail, OrderItem, OrderSummary};

/// Attempts at drawing an unused order code before giving up.
const ORDER_ID_ATTEMPTS: usize = 5;
const ORDER_LIST_LIMIT: i64 = 200;

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    customer_name: String,
    phone: String,
    address: String,
    status: OrderStatus,
    created_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: row.id,
            customer_name: row.customer_name,
            phone: row.phone,
            address: row.address,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    product_id: i32,
    sku: String,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "invalid quantity {} on order line {}",
                row.quantity, row.sku
            ))
        })?;

        Ok(Self {
            product_id: ProductId::new(row.product_id),
            sku: row.sku,
            product_name: row.product_name,
            quantity,
            unit_price: Price::new(row.unit_price),
        })
    }
}

/// Locked stock snapshot of one product.
#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    id: i32,
    sku: String,
    stock: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderSummaryRow {
    id: OrderId,
    customer_name: String,
    phone: String,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    item_count: i64,
    total: Decimal,
}

impl TryFrom<OrderSummaryRow> for OrderSummary {
    type Error = RepositoryError;

    fn try_from(row: OrderSummaryRow) -> Result<Self, Self::Error> {
        let item_count = u32::try_from(row.item_count).map_err(|_| {
            RepositoryError::DataCorruption(format!("invalid item count for order {}", row.id))
        })?;

        Ok(Self {
            id: row.id,
            customer_name: row.customer_name,
            phone: row.phone,
            status: row.status,
            created_at: row.created_at,
            item_count,
            total: Price::new(row.total),
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Place an order.
    ///
    /// Locks every product on the order (in SKU order, to avoid deadlocks
    /// between overlapping carts), re-checks stock, then inserts the order
    /// and its lines and decrements stock. Nothing is written when any line
    /// fails the stock check.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if no unused order code could be drawn.
    /// Returns `RepositoryError::Database` if a query fails.
    #[tracing::instrument(skip(self, order), fields(lines = order.lines.len()))]
    pub async fn place(&self, order: &NewOrder) -> Result<PlaceOrderOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut skus: Vec<String> = order.lines.iter().map(|line| line.sku.clone()).collect();
        skus.sort();
        skus.dedup();

        let locked = sqlx::query_as::<_, StockRow>(
            r"
            SELECT id, sku, stock
            FROM products
            WHERE sku = ANY($1)
            ORDER BY sku
            FOR UPDATE
            ",
        )
        .bind(&skus)
        .fetch_all(&mut *tx)
        .await?;

        let mut issues = Vec::new();
        let mut resolved = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            let Some(row) = locked.iter().find(|row| row.sku == line.sku) else {
                issues.push(issue(line.sku.clone(), line.name.clone(), line.quantity, StockProblem::Missing));
                continue;
            };
            let available = u32::try_from(row.stock).unwrap_or_default();
            if available == 0 {
                issues.push(issue(line.sku.clone(), line.name.clone(), line.quantity, StockProblem::SoldOut));
            } else if available < line.quantity {
                issues.push(issue(
                    line.sku.clone(),
                    line.name.clone(),
                    line.quantity,
                    StockProblem::Insufficient { available },
                ));
            } else {
                resolved.push((row.id, line));
            }
        }

        if !issues.is_empty() {
            tx.rollback().await?;
            tracing::info!(issues = issues.len(), "Order rejected by stock check");
            return Ok(PlaceOrderOutcome::Rejected(issues));
        }

        let header = insert_header(&mut tx, order).await?;

        let mut items = Vec::with_capacity(resolved.len());
        for (product_id, line) in resolved {
            let quantity = i32::try_from(line.quantity).map_err(|_| {
                RepositoryError::Conflict(format!("quantity for {} is out of range", line.sku))
            })?;

            sqlx::query(
                r"
                INSERT INTO order_items (order_id, product_id, sku, product_name, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(&header.id)
            .bind(product_id)
            .bind(&line.sku)
            .bind(&line.name)
            .bind(quantity)
            .bind(line.unit_price)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE products SET stock = stock - $1 WHERE id = $2")
                .bind(quantity)
                .bind(product_id)
                .execute(&mut *tx)
                .await?;

            items.push(OrderItem {
                product_id: ProductId::new(product_id),
                sku: line.sku.clone(),
                product_name: line.name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
            });
        }

        tx.commit().await?;
        tracing::info!(order_id = %header.id, "Order placed");

        Ok(PlaceOrderOutcome::Placed(OrderDetail {
            order: header,
            items,
        }))
    }

    /// Get an order with its lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_with_items(&self, id: &OrderId) -> Result<Option<OrderDetail>, RepositoryError> {
        let Some(row) = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, customer_name, phone, address, status, created_at
            FROM orders
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT product_id, sku, product_name, quantity, unit_price
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(TryInto::try_into)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(OrderDetail {
            order: row.into(),
            items,
        }))
    }

    /// Change an order's status.
    ///
    /// Rejected orders are terminal. Moving an order to `rejected` restores
    /// the stock of every line in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    #[tracing::instrument(skip(self), fields(order_id = %id))]
    pub async fn update_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<StatusChange, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<OrderStatus> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(previous) = current else {
            return Ok(StatusChange::NotFound);
        };
        if !previous.can_transition_to(status) {
            return Ok(StatusChange::AlreadyRejected);
        }

        sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if previous.restores_stock(status) {
            // Lock in the same order as `place`.
            sqlx::query(
                r"
                SELECT p.id
                FROM products p
                JOIN order_items oi ON oi.product_id = p.id
                WHERE oi.order_id = $1
                ORDER BY p.sku
                FOR UPDATE OF p
                ",
            )
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

            let restored = sqlx::query(
                r"
                UPDATE products p
                SET stock = p.stock + oi.quantity
                FROM order_items oi
                WHERE oi.order_id = $1 AND oi.product_id = p.id
                ",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
            tracing::info!(products = restored.rows_affected(), "Stock restored");
        }

        tx.commit().await?;

        Ok(StatusChange::Updated {
            previous,
            current: status,
        })
    }

    /// List orders, newest first, optionally filtered by customer name,
    /// phone or order code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn search(&self, search: Option<&str>) -> Result<Vec<OrderSummary>, RepositoryError> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let rows = sqlx::query_as::<_, OrderSummaryRow>(
            r"
            SELECT o.id, o.customer_name, o.phone, o.status, o.created_at,
                   COALESCE(SUM(oi.quantity), 0)::BIGINT AS item_count,
                   COALESCE(SUM(oi.quantity * oi.unit_price), 0) AS total
            FROM orders o
            LEFT JOIN order_items oi ON oi.order_id = o.id
            WHERE $1::TEXT IS NULL
               OR o.customer_name ILIKE $1
               OR o.phone ILIKE $1
               OR o.id ILIKE $1
            GROUP BY o.id
            ORDER BY o.created_at DESC
            LIMIT $2
            ",
        )
        .bind(pattern)
        .bind(ORDER_LIST_LIMIT)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

fn issue(sku: String, name: String, requested: u32, problem: StockProblem) -> StockIssue {
    StockIssue {
        sku,
        name,
        requested,
        problem,
    }
}

/// Insert the order header under a fresh code, redrawing on collision.
async fn insert_header(
    tx: &mut Transaction<'_, Postgres>,
    order: &NewOrder,
) -> Result<Order, RepositoryError> {
    for _ in 0..ORDER_ID_ATTEMPTS {
        let id = OrderId::generate();
        let row = sqlx::query_as::<_, OrderRow>(
            r"
            INSERT INTO orders (id, customer_name, phone, address)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            RETURNING id, customer_name, phone, address, status, created_at
            ",
        )
        .bind(&id)
        .bind(&order.customer.name)
        .bind(&order.customer.phone)
        .bind(&order.customer.address)
        .fetch_optional(&mut **tx)
        .await?;

        if let Some(row) = row {
            return Ok(row.into());
        }
        tracing::warn!(order_id = %id, "Order code collision, drawing another");
    }

    Err(RepositoryError::Conflict(
        "could not allocate a unique order id".to_string(),
    ))
}
