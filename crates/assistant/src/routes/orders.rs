//! Order API handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use skin_edit_core::{OrderId, OrderStatus, Price};

use crate::db::StatusChange;
use crate::error::{AppError, Result};
use crate::models::{Order, OrderItem, OrderSummary};
use crate::state::AppState;

/// Query parameters for the order listing.
#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    /// Matches customer name, phone or order id.
    pub search: Option<String>,
}

/// Order with line totals.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderLineView>,
    pub item_count: u32,
    pub total: Price,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineView {
    #[serde(flatten)]
    pub item: OrderItem,
    pub subtotal: Price,
}

/// Body of a status change.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdated {
    pub order_id: OrderId,
    pub previous: OrderStatus,
    pub status: OrderStatus,
}

/// List orders, newest first.
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<Vec<OrderSummary>>> {
    let orders = state.store().search_orders(query.search.as_deref()).await?;
    Ok(Json(orders))
}

/// Show one order with its lines.
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<OrderView>> {
    let id = OrderId::normalize(&id);
    let detail = state
        .store()
        .order_with_items(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {id} not found")))?;

    let total = detail.total();
    let item_count = detail.unit_count();
    Ok(Json(OrderView {
        order: detail.order,
        items: detail
            .items
            .into_iter()
            .map(|item| OrderLineView {
                subtotal: item.subtotal(),
                item,
            })
            .collect(),
        item_count,
        total,
    }))
}

/// Change an order's status. Rejecting restores stock.
#[instrument(skip(state, body), fields(order_id = %id))]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdate>,
) -> Result<Json<StatusUpdated>> {
    let status: OrderStatus = body
        .status
        .trim()
        .to_lowercase()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid status: {}", body.status)))?;
    let id = OrderId::normalize(&id);

    match state.store().update_order_status(&id, status).await? {
        StatusChange::Updated { previous, current } => {
            info!(%previous, %current, "Order status changed");
            if previous.restores_stock(current) {
                state.renderer().invalidate();
            }
            Ok(Json(StatusUpdated {
                order_id: id,
                previous,
                status: current,
            }))
        }
        StatusChange::AlreadyRejected => Err(AppError::BadRequest(
            "Order is already rejected.".to_string(),
        )),
        StatusChange::NotFound => Err(AppError::NotFound(format!("Order {id} not found"))),
    }
}
