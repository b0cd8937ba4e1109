//! Per-connection chat state.
//!
//! A [`Session`] is created when a websocket connects and dropped when it
//! disconnects. It is owned by the connection task, so none of its methods
//! lock or perform I/O.

pub mod registry;

use std::collections::VecDeque;

use serde::Serialize;
use uuid::Uuid;

use skin_edit_core::{ChatRole, Price, ProductId};

use crate::models::{Product, SearchFilters};

pub use registry::{RegistryStats, SessionGuard, SessionRegistry};

/// Turns kept verbatim in the history.
pub const HISTORY_LIMIT: usize = 10;
/// Oldest turns folded into the summary when the history overflows.
pub const HISTORY_COMPACT_BATCH: usize = 5;
/// Characters of each folded turn kept in the summary.
pub const SUMMARY_SNIPPET_CHARS: usize = 100;
/// Summary lines kept; older lines are dropped.
pub const SUMMARY_LINE_LIMIT: usize = 40;

const ORDINALS: [(&str, usize); 10] = [
    ("first", 1),
    ("second", 2),
    ("third", 3),
    ("fourth", 4),
    ("fifth", 5),
    ("1st", 1),
    ("2nd", 2),
    ("3rd", 3),
    ("4th", 4),
    ("5th", 5),
];

/// Opaque identifier of one websocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One cart line. `unit_price` is the price when the item was first added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub sku: String,
    pub product_id: ProductId,
    pub name: String,
    /// Always at least 1.
    pub quantity: u32,
    pub unit_price: Price,
}

impl CartLine {
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// A product from the most recent listing, addressable by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShownProduct {
    /// 1-based, matching list order.
    pub position: usize,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub price: Price,
}

impl ShownProduct {
    /// Number a product listing from 1.
    #[must_use]
    pub fn listing(products: &[Product]) -> Vec<Self> {
        products
            .iter()
            .enumerate()
            .map(|(index, product)| Self {
                position: index + 1,
                product_id: product.id,
                sku: product.sku.clone(),
                name: product.name.clone(),
                price: product.price,
            })
            .collect()
    }
}

/// What the user has told us about their skin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub skin_type: Option<String>,
    /// Lower-cased, without duplicates, in the order they were mentioned.
    pub concerns: Vec<String>,
}

impl UserProfile {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.skin_type.is_none() && self.concerns.is_empty()
    }
}

/// How far a search had to relax its filters to find anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTier {
    /// Every requested filter applied.
    Strict,
    /// Category dropped.
    WithoutCategory,
    /// Free text only, or the whole catalog by popularity.
    Broad,
}

/// Pagination cursor of the last search.
///
/// Only valid while the requested filters equal `filters`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchContext {
    /// Filters as requested by the model.
    pub filters: SearchFilters,
    /// Filters that produced the results after relaxation.
    pub effective: SearchFilters,
    pub tier: SearchTier,
    pub total: u64,
    /// Ids already shown for these filters, in order, without duplicates.
    pub shown_ids: Vec<ProductId>,
    pub page: u32,
    pub has_more: bool,
}

/// One remembered conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub role: ChatRole,
    pub content: String,
}

/// State of one chat connection.
#[derive(Debug, Clone)]
pub struct Session {
    id: ConnectionId,
    cart: Vec<CartLine>,
    last_shown: Vec<ShownProduct>,
    profile: UserProfile,
    search: Option<SearchContext>,
    history: VecDeque<HistoryEntry>,
    summary: VecDeque<String>,
    awaiting_checkout: bool,
}

impl Session {
    #[must_use]
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            cart: Vec::new(),
            last_shown: Vec::new(),
            profile: UserProfile::default(),
            search: None,
            history: VecDeque::with_capacity(HISTORY_LIMIT + 1),
            summary: VecDeque::new(),
            awaiting_checkout: false,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    // ── Cart ────────────────────────────────────────────────

    /// Add `quantity` units, merging with an existing line for the same SKU.
    ///
    /// Stock is not checked here. A zero quantity is ignored. Returns the
    /// line's new quantity.
    pub fn add_to_cart(
        &mut self,
        sku: &str,
        product_id: ProductId,
        quantity: u32,
        name: &str,
        unit_price: Price,
    ) -> u32 {
        if let Some(line) = self.cart.iter_mut().find(|line| line.sku == sku) {
            line.quantity = line.quantity.saturating_add(quantity);
            return line.quantity;
        }
        if quantity == 0 {
            return 0;
        }
        self.cart.push(CartLine {
            sku: sku.to_string(),
            product_id,
            name: name.to_string(),
            quantity,
            unit_price,
        });
        quantity
    }

    /// Remove a line. Returns it, or `None` when the SKU was not in the cart.
    pub fn remove_from_cart(&mut self, sku: &str) -> Option<CartLine> {
        let index = self.cart.iter().position(|line| line.sku == sku)?;
        Some(self.cart.remove(index))
    }

    /// Set a line's quantity; zero removes the line.
    ///
    /// Returns `false` when the SKU is not in the cart.
    pub fn update_cart_item(&mut self, sku: &str, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove_from_cart(sku).is_some();
        }
        match self.cart.iter_mut().find(|line| line.sku == sku) {
            Some(line) => {
                line.quantity = quantity;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn cart_line(&self, sku: &str) -> Option<&CartLine> {
        self.cart.iter().find(|line| line.sku == sku)
    }

    /// Cart lines in the order they were added.
    #[must_use]
    pub fn cart(&self) -> &[CartLine] {
        &self.cart
    }

    /// Sum of price × quantity, recomputed on every call.
    #[must_use]
    pub fn cart_total(&self) -> Price {
        self.cart.iter().map(CartLine::subtotal).sum()
    }

    pub fn clear_cart(&mut self) {
        self.cart.clear();
    }

    // ── Shown products ──────────────────────────────────────

    /// Replace the shown-product list wholesale.
    pub fn set_last_shown(&mut self, shown: Vec<ShownProduct>) {
        self.last_shown = shown;
    }

    #[must_use]
    pub fn last_shown(&self) -> &[ShownProduct] {
        &self.last_shown
    }

    pub fn clear_last_shown(&mut self) {
        self.last_shown.clear();
    }

    /// Resolve "that one", "the second one" or "item 3" against the last
    /// listing.
    ///
    /// `that`, `that one` and `it` mean the first item. Ordinal words are
    /// tried before digits; the first match inside the list wins.
    #[must_use]
    pub fn resolve_reference(&self, text: &str) -> Option<&ShownProduct> {
        if self.last_shown.is_empty() {
            return None;
        }
        let text = text.trim().to_lowercase();

        if matches!(text.as_str(), "that" | "that one" | "it") {
            return self.last_shown.first();
        }

        for (word, position) in ORDINALS {
            if text.contains(word) && position <= self.last_shown.len() {
                return self.last_shown.get(position - 1);
            }
        }

        let digits: String = text
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(char::is_ascii_digit)
            .collect();
        let position = digits.parse::<usize>().ok()?;
        if (1..=self.last_shown.len()).contains(&position) {
            return self.last_shown.get(position - 1);
        }
        None
    }

    // ── Profile ─────────────────────────────────────────────

    /// Overwrite the skin type and merge concerns case-insensitively.
    pub fn update_profile(&mut self, skin_type: Option<&str>, concerns: &[String]) {
        if let Some(skin_type) = skin_type.map(str::trim).filter(|s| !s.is_empty()) {
            self.profile.skin_type = Some(skin_type.to_string());
        }
        for concern in concerns {
            let concern = concern.trim().to_lowercase();
            if !concern.is_empty() && !self.profile.concerns.contains(&concern) {
                self.profile.concerns.push(concern);
            }
        }
    }

    #[must_use]
    pub const fn profile(&self) -> &UserProfile {
        &self.profile
    }

    // ── Search cursor ───────────────────────────────────────

    /// The cursor, if it belongs to exactly these filters.
    #[must_use]
    pub fn search_cursor(&self, filters: &SearchFilters) -> Option<&SearchContext> {
        self.search.as_ref().filter(|ctx| &ctx.filters == filters)
    }

    pub fn set_search_context(&mut self, context: SearchContext) {
        self.search = Some(context);
    }

    #[must_use]
    pub const fn search_context(&self) -> Option<&SearchContext> {
        self.search.as_ref()
    }

    // ── History ─────────────────────────────────────────────

    /// Append a turn, folding the oldest turns into the summary once the
    /// history grows past [`HISTORY_LIMIT`].
    pub fn add_to_history(&mut self, role: ChatRole, content: impl Into<String>) {
        self.history.push_back(HistoryEntry {
            role,
            content: content.into(),
        });

        if self.history.len() > HISTORY_LIMIT {
            let folded: Vec<HistoryEntry> = self.history.drain(..HISTORY_COMPACT_BATCH).collect();
            for entry in folded {
                let snippet: String = entry.content.chars().take(SUMMARY_SNIPPET_CHARS).collect();
                self.summary.push_back(format!("{}: {snippet}", entry.role));
            }
            while self.summary.len() > SUMMARY_LINE_LIMIT {
                self.summary.pop_front();
            }
        }
    }

    /// Recent turns, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    /// Folded older turns, one `role: text` line each.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        if self.summary.is_empty() {
            return None;
        }
        Some(self.summary.iter().cloned().collect::<Vec<_>>().join("\n"))
    }

    // ── Checkout ────────────────────────────────────────────

    #[must_use]
    pub const fn awaiting_checkout(&self) -> bool {
        self.awaiting_checkout
    }

    pub const fn set_awaiting_checkout(&mut self, awaiting: bool) {
        self.awaiting_checkout = awaiting;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn kyat(amount: i64) -> Price {
        Price::new(Decimal::new(amount, 0))
    }

    fn session() -> Session {
        Session::new(ConnectionId::new())
    }

    fn shown(position: usize, sku: &str) -> ShownProduct {
        ShownProduct {
            position,
            product_id: ProductId::new(i32::try_from(position).unwrap()),
            sku: sku.to_string(),
            name: format!("Product {sku}"),
            price: kyat(10_000),
        }
    }

    fn session_with_listing() -> Session {
        let mut session = session();
        session.set_last_shown(vec![shown(1, "A"), shown(2, "B"), shown(3, "C")]);
        session
    }

    #[test]
    fn test_add_to_cart_merges_same_sku() {
        let mut session = session();
        session.add_to_cart("SE-001", ProductId::new(1), 1, "Glow Serum", kyat(25_000));
        let quantity = session.add_to_cart("SE-001", ProductId::new(1), 2, "Glow Serum", kyat(30_000));

        assert_eq!(quantity, 3);
        assert_eq!(session.cart().len(), 1);
        assert_eq!(session.cart()[0].unit_price, kyat(25_000));
    }

    #[test]
    fn test_add_zero_quantity_creates_no_line() {
        let mut session = session();
        session.add_to_cart("SE-001", ProductId::new(1), 0, "Glow Serum", kyat(25_000));
        assert!(session.cart().is_empty());
    }

    #[test]
    fn test_update_to_zero_equals_remove() {
        let mut updated = session();
        let mut removed = session();
        for s in [&mut updated, &mut removed] {
            s.add_to_cart("SE-001", ProductId::new(1), 2, "Glow Serum", kyat(25_000));
            s.add_to_cart("TO-001", ProductId::new(2), 1, "Toner", kyat(12_000));
        }

        assert!(updated.update_cart_item("SE-001", 0));
        assert!(removed.remove_from_cart("SE-001").is_some());
        assert_eq!(updated.cart(), removed.cart());
        assert!(updated.cart().iter().all(|line| line.quantity >= 1));
    }

    #[test]
    fn test_update_missing_line_is_refused() {
        let mut session = session();
        assert!(!session.update_cart_item("SE-001", 2));
        assert!(session.cart().is_empty());
        assert!(session.remove_from_cart("SE-001").is_none());
    }

    #[test]
    fn test_cart_total_tracks_mutations() {
        let mut session = session();
        session.add_to_cart("SE-001", ProductId::new(1), 2, "Glow Serum", kyat(25_000));
        session.add_to_cart("TO-001", ProductId::new(2), 1, "Toner", kyat(12_000));
        session.update_cart_item("TO-001", 3);
        session.add_to_cart("CL-001", ProductId::new(3), 1, "Cleanser", kyat(9_000));
        session.remove_from_cart("CL-001");

        let expected: Price = session
            .cart()
            .iter()
            .map(|line| line.unit_price.times(line.quantity))
            .sum();
        assert_eq!(session.cart_total(), expected);
        assert_eq!(session.cart_total(), kyat(86_000));
    }

    #[test]
    fn test_resolve_reference_examples() {
        let session = session_with_listing();
        assert_eq!(session.resolve_reference("that one").unwrap().sku, "A");
        assert_eq!(session.resolve_reference("It").unwrap().sku, "A");
        assert_eq!(session.resolve_reference("the second one").unwrap().sku, "B");
        assert_eq!(session.resolve_reference("item 3").unwrap().sku, "C");
        assert_eq!(session.resolve_reference("the 3rd").unwrap().sku, "C");
        assert!(session.resolve_reference("banana").is_none());
    }

    #[test]
    fn test_resolve_reference_out_of_range() {
        let session = session_with_listing();
        assert!(session.resolve_reference("the fifth").is_none());
        assert!(session.resolve_reference("item 4").is_none());
        assert!(session.resolve_reference("item 0").is_none());
    }

    #[test]
    fn test_resolve_reference_prefers_ordinal_word() {
        let session = session_with_listing();
        // "second" wins over the digit 3
        assert_eq!(session.resolve_reference("second, not 3").unwrap().sku, "B");
    }

    #[test]
    fn test_resolve_reference_without_listing() {
        assert!(session().resolve_reference("that one").is_none());
    }

    #[test]
    fn test_listing_positions_follow_order() {
        let products = vec![
            crate::models::product::fixtures::product(7, "SE-007", "Serum", 20_000, 1),
            crate::models::product::fixtures::product(3, "TO-003", "Toner", 10_000, 1),
        ];
        let listing = ShownProduct::listing(&products);
        assert_eq!(listing[0].position, 1);
        assert_eq!(listing[1].position, 2);
        assert_eq!(listing[1].sku, "TO-003");
    }

    #[test]
    fn test_history_bound_and_summary() {
        let mut session = session();
        for i in 0..23 {
            let role = if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant };
            session.add_to_history(role, format!("message {i} {}", "x".repeat(200)));
            assert!(session.history().len() <= HISTORY_LIMIT);
        }

        let summary = session.summary().unwrap();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 15);
        assert!(lines[0].starts_with("user: message 0 "));
        assert_eq!(lines[0].chars().count(), "user: ".len() + SUMMARY_SNIPPET_CHARS);

        let first_kept = session.history().next().unwrap();
        assert!(first_kept.content.starts_with("message 15 "));
    }

    #[test]
    fn test_summary_is_capped() {
        let mut session = session();
        for i in 0..200 {
            session.add_to_history(ChatRole::User, format!("turn {i}"));
        }
        let summary = session.summary().unwrap();
        assert_eq!(summary.lines().count(), SUMMARY_LINE_LIMIT);
        assert!(summary.ends_with("turn 189"));
    }

    #[test]
    fn test_update_profile_merges_concerns() {
        let mut session = session();
        session.update_profile(Some("Oily"), &["Acne".to_string(), "dryness".to_string()]);
        session.update_profile(Some("Combination"), &["ACNE".to_string(), "pores".to_string()]);

        let profile = session.profile();
        assert_eq!(profile.skin_type.as_deref(), Some("Combination"));
        assert_eq!(profile.concerns, vec!["acne", "dryness", "pores"]);
    }

    #[test]
    fn test_search_cursor_requires_equal_filters() {
        let mut session = session();
        let filters = SearchFilters {
            category: Some("serum".to_string()),
            ..SearchFilters::default()
        };
        session.set_search_context(SearchContext {
            filters: filters.clone(),
            effective: filters.clone(),
            tier: SearchTier::Strict,
            total: 12,
            shown_ids: vec![ProductId::new(1)],
            page: 1,
            has_more: true,
        });

        assert!(session.search_cursor(&filters).is_some());
        assert!(session.search_cursor(&SearchFilters::default()).is_none());
    }
}
