//! Tool results and their JSON projection for the model.

use serde::Serialize;
use serde_json::{Value, json};

use skin_edit_core::Price;

use crate::models::{OrderDetail, Product, SearchFilters};
use crate::session::{CartLine, SearchTier, Session, ShownProduct, UserProfile};

/// Product descriptions in search listings are cut to this many characters.
pub const LISTING_DESCRIPTION_CHARS: usize = 150;

/// Cart contents at the time a tool ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSummary {
    pub lines: Vec<CartLine>,
    pub total: Price,
}

impl CartSummary {
    #[must_use]
    pub fn of(session: &Session) -> Self {
        Self {
            lines: session.cart().to_vec(),
            total: session.cart_total(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub requested: SearchFilters,
    pub effective: SearchFilters,
    pub tier: SearchTier,
    pub listing: Vec<ShownProduct>,
    pub products: Vec<Product>,
    pub total: u64,
    /// Products shown for this filter set so far, including this page.
    pub shown: usize,
    pub page: u32,
    pub has_more: bool,
}

/// What a tool produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Search(SearchResult),
    Product(Box<Product>),
    /// A lookup that found nothing.
    NotFound(String),
    Knowledge {
        topic: String,
        skin_type: Option<String>,
        concern: Option<String>,
    },
    Profile(UserProfile),
    Cart(CartSummary),
    /// A successful cart mutation.
    CartChange {
        message: String,
        item_count: usize,
        total: Price,
    },
    Order(Box<OrderDetail>),
    /// The request was understood but refused; state is unchanged.
    Failure(String),
    /// The tool could not run.
    Error(String),
    /// Checkout should begin. Ends the model loop for this turn.
    Checkout(CartSummary),
}

impl ToolOutcome {
    #[must_use]
    pub const fn is_checkout(&self) -> bool {
        matches!(self, Self::Checkout(_))
    }

    /// Short label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Search(_) => "search",
            Self::Product(_) => "product",
            Self::NotFound(_) => "not_found",
            Self::Knowledge { .. } => "knowledge",
            Self::Profile(_) => "profile",
            Self::Cart(_) => "cart",
            Self::CartChange { .. } => "cart_change",
            Self::Order(_) => "order",
            Self::Failure(_) => "failure",
            Self::Error(_) => "error",
            Self::Checkout(_) => "checkout",
        }
    }

    /// JSON payload returned to the model as the tool message content.
    #[must_use]
    pub fn to_model_payload(&self) -> Value {
        match self {
            Self::Search(result) => search_payload(result),
            Self::Product(product) => json!({ "found": true, "product": product }),
            Self::NotFound(message) => json!({ "found": false, "message": message }),
            Self::Knowledge {
                topic,
                skin_type,
                concern,
            } => json!({
                "type": "knowledge_question",
                "topic": topic,
                "skinType": skin_type,
                "concern": concern,
                "note": "Answer this from your own skincare knowledge. No catalog lookup was needed.",
            }),
            Self::Profile(profile) => json!({ "success": true, "profile": profile }),
            Self::Cart(cart) => cart_payload(cart),
            Self::CartChange {
                message,
                item_count,
                total,
            } => json!({
                "success": true,
                "message": message,
                "cartItemCount": item_count,
                "cartTotal": total.to_string(),
            }),
            Self::Order(detail) => order_payload(detail),
            Self::Failure(message) => json!({ "success": false, "message": message }),
            Self::Error(message) => json!({ "error": message }),
            Self::Checkout(cart) => json!({
                "type": "initiate_checkout",
                "message": "Ready to place your order. I'll need your delivery details.",
                "cartSummary": {
                    "itemCount": cart.lines.len(),
                    "total": cart.total.to_string(),
                    "items": cart.lines.iter().map(|line| json!({
                        "name": line.name,
                        "quantity": line.quantity,
                        "price": line.unit_price.to_string(),
                    })).collect::<Vec<_>>(),
                },
            }),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListedProduct<'a> {
    position: usize,
    product_id: i32,
    sku: &'a str,
    name: &'a str,
    brand: &'a str,
    category: &'a str,
    price: String,
    in_stock: bool,
    stock: u32,
    skin_types: &'a [String],
    concerns: &'a [String],
    description: String,
}

fn search_payload(result: &SearchResult) -> Value {
    if result.total == 0 {
        return json!({
            "found": false,
            "count": 0,
            "message": "No products found matching those filters.",
            "filtersUsed": result.requested,
        });
    }

    if result.products.is_empty() {
        return json!({
            "found": true,
            "count": 0,
            "total": result.total,
            "hasMore": false,
            "message": format!("All {} matching products have already been shown.", result.total),
        });
    }

    let products: Vec<ListedProduct<'_>> = result
        .listing
        .iter()
        .zip(&result.products)
        .map(|(shown, product)| ListedProduct {
            position: shown.position,
            product_id: product.id.as_i32(),
            sku: &product.sku,
            name: &product.name,
            brand: &product.brand,
            category: &product.category,
            price: product.price.to_string(),
            in_stock: product.stock > 0,
            stock: product.stock,
            skin_types: &product.skin_types,
            concerns: &product.concerns,
            description: truncate(&product.description, LISTING_DESCRIPTION_CHARS),
        })
        .collect();

    let mut payload = json!({
        "found": true,
        "count": products.len(),
        "total": result.total,
        "page": result.page,
        "hasMore": result.has_more,
        "showing": format!("{} of {}", result.shown, result.total),
        "products": products,
    });

    let note = match result.tier {
        SearchTier::Strict => None,
        SearchTier::WithoutCategory => {
            Some("Nothing matched the category, so it was ignored. Tell the user the results are broader than asked.")
        }
        SearchTier::Broad => Some(
            "Nothing matched the filters, so these are the closest broader results. Tell the user they are suggestions, not exact matches.",
        ),
    };
    if let (Some(note), Some(object)) = (note, payload.as_object_mut()) {
        object.insert("relaxed".to_string(), json!(note));
        object.insert("filtersUsed".to_string(), json!(result.effective));
    }
    payload
}

fn cart_payload(cart: &CartSummary) -> Value {
    if cart.is_empty() {
        return json!({ "empty": true, "message": "Your cart is empty." });
    }
    json!({
        "empty": false,
        "itemCount": cart.lines.len(),
        "total": cart.total.to_string(),
        "items": cart.lines.iter().map(|line| json!({
            "sku": line.sku,
            "productId": line.product_id.as_i32(),
            "name": line.name,
            "quantity": line.quantity,
            "price": line.unit_price.to_string(),
            "subtotal": line.subtotal().to_string(),
        })).collect::<Vec<_>>(),
    })
}

fn order_payload(detail: &OrderDetail) -> Value {
    let order = &detail.order;
    json!({
        "found": true,
        "order": {
            "orderId": order.id.as_str(),
            "customerName": order.customer_name,
            "phone": order.phone,
            "address": order.address,
            "status": order.status.as_str(),
            "createdAt": order.created_at.to_rfc3339(),
            "itemCount": detail.unit_count(),
            "total": detail.total().to_string(),
            "items": detail.items.iter().map(|item| json!({
                "productName": item.product_name,
                "sku": item.sku,
                "quantity": item.quantity,
                "price": item.unit_price.to_string(),
                "subtotal": item.subtotal().to_string(),
            })).collect::<Vec<_>>(),
        }
    })
}

/// Cut `text` to `max` characters, marking the cut with `...`.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}
