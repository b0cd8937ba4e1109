//! Order management commands.

use tracing::info;

use skin_edit_assistant::db::{OrderRepository, StatusChange};
use skin_edit_assistant::models::OrderSummary;
use skin_edit_core::{OrderId, OrderStatus};

use super::CommandError;

/// One table row of the order listing.
fn format_row(order: &OrderSummary) -> String {
    format!(
        "{:<8}  {:<10}  {:<20}  {:<12}  {:>3}  {:>14}  {}",
        order.id.as_str(),
        order.status.as_str(),
        order.customer_name,
        order.phone,
        order.item_count,
        order.total.to_string(),
        order.created_at.format("%Y-%m-%d %H:%M"),
    )
}

/// Parse a status argument case-insensitively.
fn parse_status(status: &str) -> Result<OrderStatus, CommandError> {
    status
        .trim()
        .to_lowercase()
        .parse()
        .map_err(|_| CommandError::InvalidArgument(format!("Invalid status: {status}")))
}

/// List orders, newest first.
///
/// # Errors
///
/// Returns an error if the database is unreachable.
pub async fn list(search: Option<&str>) -> Result<(), CommandError> {
    let pool = super::connect().await?;
    let orders = OrderRepository::new(&pool).search(search).await?;

    #[allow(clippy::print_stdout)]
    {
        for order in &orders {
            println!("{}", format_row(order));
        }
    }
    info!(count = orders.len(), "Orders listed");
    Ok(())
}

/// Change an order's status.
///
/// # Errors
///
/// Returns an error for an unknown status or order, for an order that is
/// already rejected, or if the database is unreachable.
pub async fn set_status(id: &str, status: &str) -> Result<(), CommandError> {
    let status = parse_status(status)?;
    let id = OrderId::normalize(id);

    let pool = super::connect().await?;
    match OrderRepository::new(&pool).update_status(&id, status).await? {
        StatusChange::Updated { previous, current } => {
            info!(order_id = %id, %previous, %current, "Order status changed");
            if previous.restores_stock(current) {
                info!(order_id = %id, "Stock restored");
            }
            Ok(())
        }
        StatusChange::AlreadyRejected => Err(CommandError::InvalidArgument(
            "Order is already rejected.".to_string(),
        )),
        StatusChange::NotFound => Err(CommandError::InvalidArgument(format!(
            "Order {id} not found"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("Shipped").unwrap(), OrderStatus::Shipped);
        assert_eq!(parse_status(" rejected ").unwrap(), OrderStatus::Rejected);
        let err = parse_status("lost").unwrap_err();
        assert_eq!(err.to_string(), "Invalid status: lost");
    }
}
