//! Order models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use skin_edit_core::{OrderId, OrderStatus, Price, ProductId};

/// An order header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub customer_name: String,
    pub phone: String,
    pub address: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// One order line. Name and price are snapshots taken at cart-add time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub sku: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Price,
}

impl OrderItem {
    /// Line total.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// An order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderDetail {
    /// Sum of line totals.
    #[must_use]
    pub fn total(&self) -> Price {
        self.items.iter().map(OrderItem::subtotal).sum()
    }

    /// Total number of units across lines.
    #[must_use]
    pub fn unit_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

/// Delivery details collected during checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerInfo {
    pub name: String,
    /// Digits only, e.g. `09123456789`.
    pub phone: String,
    pub address: String,
}

/// A line of an order about to be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Price,
}

/// Everything needed to place an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub customer: CustomerInfo,
    pub lines: Vec<NewOrderLine>,
}

/// Row of the order listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: OrderId,
    pub customer_name: String,
    pub phone: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub item_count: u32,
    pub total: Price,
}

impl From<&OrderDetail> for OrderSummary {
    fn from(detail: &OrderDetail) -> Self {
        Self {
            id: detail.order.id.clone(),
            customer_name: detail.order.customer_name.clone(),
            phone: detail.order.phone.clone(),
            status: detail.order.status,
            created_at: detail.order.created_at,
            item_count: detail.unit_count(),
            total: detail.total(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn detail() -> OrderDetail {
        OrderDetail {
            order: Order {
                id: OrderId::parse("A1B2C3D4").unwrap(),
                customer_name: "Aye Aye".to_string(),
                phone: "09123456789".to_string(),
                address: "12 Pyay Rd".to_string(),
                status: OrderStatus::Pending,
                created_at: Utc::now(),
            },
            items: vec![
                OrderItem {
                    product_id: ProductId::new(1),
                    sku: "SE-001".to_string(),
                    product_name: "Glow Serum".to_string(),
                    quantity: 2,
                    unit_price: Price::new(Decimal::new(25_000, 0)),
                },
                OrderItem {
                    product_id: ProductId::new(2),
                    sku: "TO-001".to_string(),
                    product_name: "Toner".to_string(),
                    quantity: 1,
                    unit_price: Price::new(Decimal::new(12_000, 0)),
                },
            ],
        }
    }

    #[test]
    fn test_total_is_sum_of_subtotals() {
        let detail = detail();
        assert_eq!(detail.total(), Price::new(Decimal::new(62_000, 0)));
        assert_eq!(detail.unit_count(), 3);
    }

    #[test]
    fn test_summary_from_detail() {
        let summary = OrderSummary::from(&detail());
        assert_eq!(summary.id.as_str(), "A1B2C3D4");
        assert_eq!(summary.item_count, 3);
    }

    #[test]
    fn test_detail_serializes_flat() {
        let json = serde_json::to_value(detail()).unwrap();
        assert_eq!(json["id"], "A1B2C3D4");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["items"][0]["productName"], "Glow Serum");
    }
}
