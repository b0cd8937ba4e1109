//! Conversation services: the tool-calling loop and the checkout flow.

pub mod chat;
pub mod checkout;

pub use chat::{ChatError, ChatService};
pub use checkout::{Checkout, CheckoutStep, CustomerInfoError, parse_customer_info};
