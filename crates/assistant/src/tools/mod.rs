//! Tool registry: the functions the model may call.
//!
//! Tool names form a closed set ([`ToolName`]). The schema list sent to the
//! model is generated from that set, and [`Tool::parse`] turns a raw tool call
//! into a typed variant, so the registry and the schemas cannot drift apart.

pub mod executor;
pub mod results;

use std::sync::LazyLock;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

use skin_edit_core::ProductId;

use crate::llm::{FunctionSchema, ToolSchema};
use crate::models::SearchFilters;

pub use executor::{SEARCH_PAGE_SIZE, ToolExecutor};
pub use results::{CartSummary, SearchResult, ToolOutcome};

/// Schemas for every tool, in registry order.
pub static TOOL_SCHEMAS: LazyLock<Vec<ToolSchema>> =
    LazyLock::new(|| ToolName::ALL.iter().map(|name| name.schema()).collect());

/// Errors decoding a tool call from the model.
#[derive(Debug, Error)]
pub enum ToolParseError {
    #[error("Unknown function: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: ToolName,
        #[source]
        source: serde_json::Error,
    },
}

/// Every tool the model can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    SearchProducts,
    GetProductDetail,
    GetProductDetailsBySku,
    GetSkincareKnowledge,
    UpdateUserProfile,
    GetCartState,
    AddToCart,
    RemoveFromCart,
    UpdateCartItem,
    InitiateOrder,
    GetOrderInfo,
}

impl ToolName {
    pub const ALL: [Self; 11] = [
        Self::SearchProducts,
        Self::GetProductDetail,
        Self::GetProductDetailsBySku,
        Self::GetSkincareKnowledge,
        Self::UpdateUserProfile,
        Self::GetCartState,
        Self::AddToCart,
        Self::RemoveFromCart,
        Self::UpdateCartItem,
        Self::InitiateOrder,
        Self::GetOrderInfo,
    ];

    /// Name as it appears in the schema and in tool calls.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SearchProducts => "searchProducts",
            Self::GetProductDetail => "getProductDetail",
            Self::GetProductDetailsBySku => "getProductDetailsBySKU",
            Self::GetSkincareKnowledge => "getSkincareKnowledge",
            Self::UpdateUserProfile => "updateUserProfile",
            Self::GetCartState => "getCartState",
            Self::AddToCart => "addToCart",
            Self::RemoveFromCart => "removeFromCart",
            Self::UpdateCartItem => "updateCartItem",
            Self::InitiateOrder => "initiateOrder",
            Self::GetOrderInfo => "getOrderInfo",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    /// Short status line shown to the user while the tool runs.
    #[must_use]
    pub const fn progress_label(self) -> &'static str {
        match self {
            Self::SearchProducts => "Searching products...",
            Self::GetProductDetail | Self::GetProductDetailsBySku => "Looking up product details...",
            Self::GetSkincareKnowledge => "Checking skincare knowledge...",
            Self::UpdateUserProfile => "Updating your profile...",
            Self::GetCartState => "Checking your cart...",
            Self::AddToCart => "Adding to cart...",
            Self::RemoveFromCart => "Removing from cart...",
            Self::UpdateCartItem => "Updating your cart...",
            Self::InitiateOrder => "Preparing checkout...",
            Self::GetOrderInfo => "Looking up your order...",
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::SearchProducts => {
                "Search the catalog by free text and/or filters (category, skin type, concern, brand, max price). \
                 Returns up to 8 products ranked by popularity. Calling again with exactly the same arguments \
                 returns the next page. If nothing matches, filters are relaxed automatically and the result says so."
            }
            Self::GetProductDetail => {
                "Get full details (ingredients, description, volume, stock) for one product by its numeric productId."
            }
            Self::GetProductDetailsBySku => {
                "Get full details for one product by its SKU, or by a reference to a product shown earlier \
                 ('the second one', 'that one', 'item 3'). Use SKUs from the conversation or previous tool results; never guess."
            }
            Self::GetSkincareKnowledge => {
                "Use for general skincare questions (routines, ingredients, how to treat a concern) that do not need catalog data. \
                 Answer from your own knowledge after calling this."
            }
            Self::UpdateUserProfile => {
                "Record the user's skin type and/or skincare concerns. Only call when the user explicitly states them. \
                 Skin types: All Skin Types, Combination, Dry, Normal, Oily, Sensitive."
            }
            Self::GetCartState => {
                "Get the cart: items, quantities, prices and total. Call before changing quantities, before checkout, \
                 or when a reference like 'remove item 2' is ambiguous. Never assume cart contents."
            }
            Self::AddToCart => {
                "Add a product to the cart by SKU (or by a reference to a product shown earlier). Quantity defaults to 1. \
                 Call once per product. Fails without changing the cart if there is not enough stock."
            }
            Self::RemoveFromCart => {
                "Remove a product from the cart completely. Call getCartState first if the reference is ambiguous."
            }
            Self::UpdateCartItem => {
                "Change the quantity of an item already in the cart. Quantity 0 removes it. Use addToCart for new items."
            }
            Self::InitiateOrder => {
                "Start checkout when the user wants to place the order. The backend then collects name, phone and \
                 delivery address and places the order. Call getCartState first to confirm the cart is not empty."
            }
            Self::GetOrderInfo => {
                "Look up a past order by its 8-character order ID (e.g. 'A1B2C3D4'): status, items, customer details and total."
            }
        }
    }

    fn parameters(self) -> serde_json::Value {
        let product_ref = json!({
            "sku": {
                "type": "string",
                "description": "Product SKU, e.g. 'SE-001'."
            },
            "reference": {
                "type": "string",
                "description": "Reference to a product from the last list shown, e.g. 'the second one', 'that one', 'item 3'. Used when sku is not given."
            }
        });

        match self {
            Self::SearchProducts => json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Free-text search, e.g. 'vitamin c serum'." },
                    "category": { "type": "string", "description": "Product category, e.g. 'Serum', 'Cleanser'." },
                    "skinType": { "type": "string", "description": "Skin type, e.g. 'Oily', 'Dry'." },
                    "concern": { "type": "string", "description": "Skin concern, e.g. 'acne', 'dryness'." },
                    "brand": { "type": "string", "description": "Brand name." },
                    "maxPrice": { "type": "number", "description": "Maximum price in MMK." }
                },
                "required": []
            }),
            Self::GetProductDetail => json!({
                "type": "object",
                "properties": {
                    "productId": { "type": "integer", "description": "Numeric product ID from search results." }
                },
                "required": ["productId"]
            }),
            Self::GetProductDetailsBySku | Self::RemoveFromCart => json!({
                "type": "object",
                "properties": product_ref,
                "required": []
            }),
            Self::GetSkincareKnowledge => json!({
                "type": "object",
                "properties": {
                    "topic": { "type": "string", "description": "The question or topic, e.g. 'double cleansing'." },
                    "skinType": { "type": "string", "description": "Skin type the question is about, if any." },
                    "concern": { "type": "string", "description": "Concern the question is about, if any." }
                },
                "required": ["topic"]
            }),
            Self::UpdateUserProfile => json!({
                "type": "object",
                "properties": {
                    "skinType": { "type": "string", "description": "The user's skin type." },
                    "concerns": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Skincare concerns, e.g. ['acne', 'anti-aging']."
                    }
                },
                "required": []
            }),
            Self::GetCartState | Self::InitiateOrder => json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
            Self::AddToCart => json!({
                "type": "object",
                "properties": merge(product_ref, json!({
                    "quantity": { "type": "integer", "description": "How many. Defaults to 1.", "default": 1, "minimum": 1 }
                })),
                "required": []
            }),
            Self::UpdateCartItem => json!({
                "type": "object",
                "properties": merge(product_ref, json!({
                    "quantity": { "type": "integer", "description": "New quantity. 0 removes the item.", "minimum": 0 }
                })),
                "required": ["quantity"]
            }),
            Self::GetOrderInfo => json!({
                "type": "object",
                "properties": {
                    "orderId": { "type": "string", "description": "The 8-character order ID, e.g. 'A1B2C3D4'." }
                },
                "required": ["orderId"]
            }),
        }
    }

    /// Schema entry sent to the model.
    #[must_use]
    pub fn schema(self) -> ToolSchema {
        ToolSchema {
            kind: "function",
            function: FunctionSchema {
                name: self.as_str(),
                description: self.description(),
                parameters: self.parameters(),
            },
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn merge(mut base: serde_json::Value, extra: serde_json::Value) -> serde_json::Value {
    if let (Some(base), serde_json::Value::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    base
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchArgs {
    pub query: Option<String>,
    pub category: Option<String>,
    pub skin_type: Option<String>,
    pub concern: Option<String>,
    pub brand: Option<String>,
    pub max_price: Option<Decimal>,
}

impl SearchArgs {
    /// Normalized filter set used as the pagination key.
    #[must_use]
    pub fn filters(self) -> SearchFilters {
        SearchFilters {
            query: self.query,
            category: self.category,
            skin_type: self.skin_type,
            concern: self.concern,
            brand: self.brand,
            max_price: self.max_price,
        }
        .normalized()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductIdArgs {
    pub product_id: ProductId,
}

/// A product named by SKU or by a reference into the last listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProductRef {
    pub sku: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeArgs {
    pub topic: String,
    pub skin_type: Option<String>,
    pub concern: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileArgs {
    pub skin_type: Option<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
}

const fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddToCartArgs {
    #[serde(flatten)]
    pub product: ProductRef,
    #[serde(default = "one")]
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateCartArgs {
    #[serde(flatten)]
    pub product: ProductRef,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderInfoArgs {
    pub order_id: String,
}

/// A decoded tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tool {
    SearchProducts(SearchArgs),
    GetProductDetail(ProductIdArgs),
    GetProductDetailsBySku(ProductRef),
    GetSkincareKnowledge(KnowledgeArgs),
    UpdateUserProfile(ProfileArgs),
    GetCartState,
    AddToCart(AddToCartArgs),
    RemoveFromCart(ProductRef),
    UpdateCartItem(UpdateCartArgs),
    InitiateOrder,
    GetOrderInfo(OrderInfoArgs),
}

impl Tool {
    /// Decode a tool call. Empty arguments are read as `{}`.
    ///
    /// # Errors
    ///
    /// Returns `ToolParseError::UnknownTool` for a name outside the registry
    /// and `ToolParseError::InvalidArguments` when the arguments are not a
    /// JSON object of the expected shape.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolParseError> {
        let tool = ToolName::from_name(name)
            .ok_or_else(|| ToolParseError::UnknownTool(name.to_string()))?;
        let raw = if arguments.trim().is_empty() { "{}" } else { arguments };

        Ok(match tool {
            ToolName::SearchProducts => Self::SearchProducts(decode(tool, raw)?),
            ToolName::GetProductDetail => Self::GetProductDetail(decode(tool, raw)?),
            ToolName::GetProductDetailsBySku => Self::GetProductDetailsBySku(decode(tool, raw)?),
            ToolName::GetSkincareKnowledge => Self::GetSkincareKnowledge(decode(tool, raw)?),
            ToolName::UpdateUserProfile => Self::UpdateUserProfile(decode(tool, raw)?),
            ToolName::GetCartState => {
                decode::<serde_json::Map<String, serde_json::Value>>(tool, raw)?;
                Self::GetCartState
            }
            ToolName::AddToCart => Self::AddToCart(decode(tool, raw)?),
            ToolName::RemoveFromCart => Self::RemoveFromCart(decode(tool, raw)?),
            ToolName::UpdateCartItem => Self::UpdateCartItem(decode(tool, raw)?),
            ToolName::InitiateOrder => {
                decode::<serde_json::Map<String, serde_json::Value>>(tool, raw)?;
                Self::InitiateOrder
            }
            ToolName::GetOrderInfo => Self::GetOrderInfo(decode(tool, raw)?),
        })
    }

    #[must_use]
    pub const fn name(&self) -> ToolName {
        match self {
            Self::SearchProducts(_) => ToolName::SearchProducts,
            Self::GetProductDetail(_) => ToolName::GetProductDetail,
            Self::GetProductDetailsBySku(_) => ToolName::GetProductDetailsBySku,
            Self::GetSkincareKnowledge(_) => ToolName::GetSkincareKnowledge,
            Self::UpdateUserProfile(_) => ToolName::UpdateUserProfile,
            Self::GetCartState => ToolName::GetCartState,
            Self::AddToCart(_) => ToolName::AddToCart,
            Self::RemoveFromCart(_) => ToolName::RemoveFromCart,
            Self::UpdateCartItem(_) => ToolName::UpdateCartItem,
            Self::InitiateOrder => ToolName::InitiateOrder,
            Self::GetOrderInfo(_) => ToolName::GetOrderInfo,
        }
    }
}

fn decode<T: DeserializeOwned>(tool: ToolName, raw: &str) -> Result<T, ToolParseError> {
    serde_json::from_str(raw).map_err(|source| ToolParseError::InvalidArguments { tool, source })
}
