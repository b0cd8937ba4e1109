//! Checkout: collecting delivery details and placing the order.
//!
//! Checkout starts when the model calls `initiateOrder`. The next user
//! message is then read as delivery details instead of going to the model:
//!
//! ```text
//! Name: Aye Aye, Phone: 09123456789, Address: 12 Pansodan St, Yangon
//! Aye Aye, 09123456789, 12 Pansodan St, Yangon
//! ```
//!
//! A parse failure re-prompts and keeps waiting. Placing the order, a stock
//! conflict or `cancel` ends checkout.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::db::{CommerceStore, PlaceOrderOutcome, RepositoryError, StockIssue, StockProblem};
use crate::models::{CustomerInfo, NewOrder, NewOrderLine, OrderDetail};
use crate::session::Session;
use crate::tools::CartSummary;

/// Reply that leaves checkout without ordering.
pub const CANCEL_WORD: &str = "cancel";

static LABELED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)name\s*:\s*(.+?)\s*,\s*phone\s*:\s*(.+?)\s*,\s*address\s*:\s*(.+)")
        .expect("Invalid regex")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^09\d{9}$").expect("Invalid regex"));

/// Why delivery details could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CustomerInfoError {
    #[error("expected name, phone and address separated by commas")]
    Format,
    #[error("{0} is empty")]
    Empty(&'static str),
    #[error("phone number must be 11 digits starting with 09")]
    Phone,
}

/// Parse delivery details in either the labeled or the positional shape.
///
/// The phone number is returned with spaces and dashes removed.
///
/// # Errors
///
/// Returns `CustomerInfoError` when neither shape matches, a field is blank,
/// or the phone number is not `09` followed by nine digits.
pub fn parse_customer_info(text: &str) -> Result<CustomerInfo, CustomerInfoError> {
    let text = text.trim();

    let (name, phone, address) = if let Some(caps) = LABELED_RE.captures(text) {
        let field = |i| caps.get(i).map_or("", |m| m.as_str().trim());
        (field(1).to_string(), field(2).to_string(), field(3).to_string())
    } else {
        let mut parts = text.split(',').map(str::trim);
        let (Some(name), Some(phone)) = (parts.next(), parts.next()) else {
            return Err(CustomerInfoError::Format);
        };
        let rest: Vec<&str> = parts.collect();
        if rest.is_empty() {
            return Err(CustomerInfoError::Format);
        }
        (name.to_string(), phone.to_string(), rest.join(", "))
    };

    if name.is_empty() {
        return Err(CustomerInfoError::Empty("name"));
    }
    if address.trim_matches([',', ' ']).is_empty() {
        return Err(CustomerInfoError::Empty("address"));
    }

    let phone: String = phone.chars().filter(|c| *c != ' ' && *c != '-').collect();
    if !PHONE_RE.is_match(&phone) {
        return Err(CustomerInfoError::Phone);
    }

    Ok(CustomerInfo {
        name,
        phone,
        address,
    })
}

/// What happened to a reply sent while checkout was waiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutStep {
    Cancelled,
    /// Details could not be read; still waiting.
    Retry(CustomerInfoError),
    /// The cart was emptied before the details arrived.
    EmptyCart,
    Placed(Box<OrderDetail>),
    /// Stock changed since the items were added. Sold-out lines were removed
    /// from the cart.
    Rejected(Vec<StockIssue>),
}

impl CheckoutStep {
    /// Text sent to the user.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Cancelled => {
                "Checkout cancelled. Your cart is still saved, so you can keep shopping.".to_string()
            }
            Self::Retry(error) => retry_message(*error),
            Self::EmptyCart => "Your cart is empty, so there is nothing to order.".to_string(),
            Self::Placed(detail) => confirmation_message(detail),
            Self::Rejected(issues) => rejection_message(issues),
        }
    }

    /// Whether checkout is over after this step.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        !matches!(self, Self::Retry(_))
    }
}

/// Enter checkout. Returns the cart summary and the request for details.
pub fn begin(session: &mut Session, cart: &CartSummary) -> String {
    session.set_awaiting_checkout(true);
    info!(lines = cart.lines.len(), total = %cart.total, "Checkout started");
    summary_message(cart)
}

/// Runs checkout against the data store.
pub struct Checkout<'a, S: CommerceStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: CommerceStore + ?Sized> Checkout<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Handle the reply to the details request.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the order could not be written. Checkout
    /// keeps waiting in that case so the user can send the details again.
    #[instrument(skip_all, fields(connection_id = %session.id()))]
    pub async fn handle_reply(
        &self,
        session: &mut Session,
        text: &str,
    ) -> Result<CheckoutStep, RepositoryError> {
        if text.trim().eq_ignore_ascii_case(CANCEL_WORD) {
            session.set_awaiting_checkout(false);
            info!("Checkout cancelled");
            return Ok(CheckoutStep::Cancelled);
        }

        let customer = match parse_customer_info(text) {
            Ok(customer) => customer,
            Err(e) => {
                info!(reason = %e, "Delivery details rejected");
                return Ok(CheckoutStep::Retry(e));
            }
        };

        if session.cart().is_empty() {
            session.set_awaiting_checkout(false);
            return Ok(CheckoutStep::EmptyCart);
        }

        let order = NewOrder {
            customer,
            lines: session
                .cart()
                .iter()
                .map(|line| NewOrderLine {
                    product_id: line.product_id,
                    sku: line.sku.clone(),
                    name: line.name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
                .collect(),
        };

        match self.store.place_order(&order).await? {
            PlaceOrderOutcome::Placed(detail) => {
                info!(order_id = %detail.order.id, total = %detail.total(), "Order placed");
                session.clear_cart();
                session.clear_last_shown();
                session.set_awaiting_checkout(false);
                Ok(CheckoutStep::Placed(Box::new(detail)))
            }
            PlaceOrderOutcome::Rejected(issues) => {
                warn!(issues = issues.len(), "Order rejected on stock re-check");
                for issue in &issues {
                    if issue.problem == StockProblem::SoldOut {
                        session.remove_from_cart(&issue.sku);
                    }
                }
                session.set_awaiting_checkout(false);
                Ok(CheckoutStep::Rejected(issues))
            }
        }
    }
}

fn summary_message(cart: &CartSummary) -> String {
    let mut text = String::from("Great! Here's what you're ordering:\n\n");
    for line in &cart.lines {
        let _ = writeln!(text, "  • {}x {} - {}", line.quantity, line.name, line.subtotal());
    }
    let _ = write!(
        text,
        "\nTotal: {}\n\n\
         To complete your order, please send your name, phone number and delivery address in one message, either as:\n\
         Name: John Doe, Phone: 09123456789, Address: 123 Main St\n\
         or simply:\n\
         John Doe, 09123456789, 123 Main St\n\n\
         Reply \"{CANCEL_WORD}\" to keep shopping instead.",
        cart.total
    );
    text
}

fn retry_message(error: CustomerInfoError) -> String {
    let problem = match error {
        CustomerInfoError::Phone => "That phone number doesn't look right.",
        CustomerInfoError::Empty(_) | CustomerInfoError::Format => {
            "I couldn't read your delivery details."
        }
    };
    format!(
        "{problem} Please check:\n\
         • Name: your full name\n\
         • Phone: Must start with 09 and have exactly 11 digits (e.g., 09123456789)\n\
         • Address: your delivery address\n\n\
         Example: Name: John Doe, Phone: 09123456789, Address: 123 Main St\n\n\
         Reply \"{CANCEL_WORD}\" to go back to shopping."
    )
}

fn confirmation_message(detail: &OrderDetail) -> String {
    let order = &detail.order;
    let mut text = format!(
        "Order Confirmed!\n\n\
         Order ID: {}\n\
         Customer: {}\n\
         Phone: {}\n\
         Address: {}\n\n\
         Items:\n",
        order.id, order.customer_name, order.phone, order.address
    );
    for item in &detail.items {
        let _ = writeln!(text, "  • {}x {} - {}", item.quantity, item.product_name, item.subtotal());
    }
    let _ = write!(
        text,
        "\nTotal: {}\nStatus: {}\n\n\
         Thank you for shopping with us! Keep your order ID to check on your order later.",
        detail.total(),
        order.status
    );
    text
}

fn rejection_message(issues: &[StockIssue]) -> String {
    let mut text = String::from("Sorry, I couldn't place your order because stock has changed:\n");
    for issue in issues {
        let _ = writeln!(text, "  • {issue}");
    }
    if issues.iter().any(|issue| issue.problem == StockProblem::SoldOut) {
        text.push_str("\nI removed the sold-out items from your cart.");
    }
    text.push_str("\nPlease review your cart and let me know when you're ready to check out again.");
    text
}
