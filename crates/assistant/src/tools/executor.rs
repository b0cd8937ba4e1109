//! Tool execution against the session and the data store.

use tracing::instrument;

use skin_edit_core::OrderId;

use crate::db::{CommerceStore, RepositoryError};
use crate::models::{SearchFilters, SearchPage, SearchQuery};
use crate::session::{SearchContext, SearchTier, Session, ShownProduct};

use super::results::{CartSummary, SearchResult, ToolOutcome};
use super::{
    AddToCartArgs, KnowledgeArgs, OrderInfoArgs, ProductIdArgs, ProductRef, ProfileArgs, SearchArgs,
    Tool, UpdateCartArgs,
};

/// Products per search page.
pub const SEARCH_PAGE_SIZE: u32 = 8;

type ToolResult = Result<ToolOutcome, RepositoryError>;

/// Runs decoded tool calls. Each call commits on its own.
pub struct ToolExecutor<'a, S: CommerceStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: CommerceStore + ?Sized> ToolExecutor<'a, S> {
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Run one tool. Store failures become an error result for the model.
    #[instrument(skip_all, fields(tool = %tool.name()))]
    pub async fn execute(&self, session: &mut Session, tool: Tool) -> ToolOutcome {
        let name = tool.name();
        let outcome = match self.dispatch(session, tool).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Tool failed");
                ToolOutcome::Error(format!("{name} failed: {e}"))
            }
        };
        tracing::debug!(outcome = outcome.kind(), "Tool finished");
        outcome
    }

    async fn dispatch(&self, session: &mut Session, tool: Tool) -> ToolResult {
        match tool {
            Tool::SearchProducts(args) => self.search_products(session, args).await,
            Tool::GetProductDetail(args) => self.product_detail(args).await,
            Tool::GetProductDetailsBySku(product) => self.product_by_sku(session, &product).await,
            Tool::GetSkincareKnowledge(args) => Ok(knowledge(args)),
            Tool::UpdateUserProfile(args) => Ok(update_profile(session, &args)),
            Tool::GetCartState => Ok(ToolOutcome::Cart(CartSummary::of(session))),
            Tool::AddToCart(args) => self.add_to_cart(session, args).await,
            Tool::RemoveFromCart(product) => Ok(remove_from_cart(session, &product)),
            Tool::UpdateCartItem(args) => self.update_cart_item(session, args).await,
            Tool::InitiateOrder => Ok(initiate_order(session)),
            Tool::GetOrderInfo(args) => self.order_info(args).await,
        }
    }

    // ── Catalog ─────────────────────────────────────────────

    async fn search_products(&self, session: &mut Session, args: SearchArgs) -> ToolResult {
        let requested = args.filters();
        let cursor = session
            .search_cursor(&requested)
            .map(|ctx| (ctx.effective.clone(), ctx.tier, ctx.shown_ids.clone(), ctx.page));

        let (effective, tier, mut shown_ids, page_no, page) = match cursor {
            Some((effective, tier, shown_ids, page_no)) => {
                let page = self
                    .store
                    .search_products(&SearchQuery {
                        filters: effective.clone(),
                        exclude: shown_ids.clone(),
                        limit: SEARCH_PAGE_SIZE,
                    })
                    .await?;
                (effective, tier, shown_ids, page_no + 1, page)
            }
            None => {
                let (effective, tier, page) = self.first_page(&requested).await?;
                (effective, tier, Vec::new(), 1, page)
            }
        };

        if page.products.is_empty() {
            let shown = shown_ids.len();
            if page.total > 0 {
                // Every match was already shown; keep the cursor where it is.
                session.set_search_context(SearchContext {
                    filters: requested.clone(),
                    effective: effective.clone(),
                    tier,
                    total: page.total,
                    shown_ids,
                    page: page_no.saturating_sub(1).max(1),
                    has_more: false,
                });
            }
            return Ok(ToolOutcome::Search(SearchResult {
                requested,
                effective,
                tier,
                listing: Vec::new(),
                products: Vec::new(),
                total: page.total,
                shown,
                page: page_no,
                has_more: false,
            }));
        }

        for product in &page.products {
            if !shown_ids.contains(&product.id) {
                shown_ids.push(product.id);
            }
        }
        let shown = shown_ids.len();
        let has_more = u64::try_from(shown).unwrap_or(u64::MAX) < page.total;
        let listing = ShownProduct::listing(&page.products);

        tracing::info!(
            tier = ?tier,
            total = page.total,
            page = page_no,
            count = page.products.len(),
            "Search completed"
        );

        session.set_last_shown(listing.clone());
        session.set_search_context(SearchContext {
            filters: requested.clone(),
            effective: effective.clone(),
            tier,
            total: page.total,
            shown_ids,
            page: page_no,
            has_more,
        });

        Ok(ToolOutcome::Search(SearchResult {
            requested,
            effective,
            tier,
            listing,
            products: page.products,
            total: page.total,
            shown,
            page: page_no,
            has_more,
        }))
    }

    /// Strict filters, then without category, then free text only.
    async fn first_page(
        &self,
        requested: &SearchFilters,
    ) -> Result<(SearchFilters, SearchTier, SearchPage), RepositoryError> {
        let mut ladder = vec![(SearchTier::Strict, requested.clone())];
        if requested.category.is_some() {
            ladder.push((SearchTier::WithoutCategory, requested.without_category()));
        }
        let broad = requested.free_text_only();
        if ladder.iter().all(|(_, filters)| *filters != broad) {
            ladder.push((SearchTier::Broad, broad));
        }

        let mut last = (requested.clone(), SearchTier::Strict, SearchPage::default());
        for (tier, filters) in ladder {
            let page = self
                .store
                .search_products(&SearchQuery {
                    filters: filters.clone(),
                    exclude: Vec::new(),
                    limit: SEARCH_PAGE_SIZE,
                })
                .await?;
            if page.total > 0 {
                return Ok((filters, tier, page));
            }
            tracing::debug!(tier = ?tier, "No matches, relaxing filters");
            last = (filters, tier, page);
        }
        Ok(last)
    }

    async fn product_detail(&self, args: ProductIdArgs) -> ToolResult {
        Ok(match self.store.product_by_id(args.product_id).await? {
            Some(product) => ToolOutcome::Product(Box::new(product)),
            None => ToolOutcome::NotFound(format!("Product with ID {} not found.", args.product_id)),
        })
    }

    async fn product_by_sku(&self, session: &Session, product: &ProductRef) -> ToolResult {
        let sku = match resolve_sku(session, product) {
            Ok(sku) => sku,
            Err(outcome) => return Ok(outcome),
        };
        Ok(match self.store.product_by_sku(&sku).await? {
            Some(product) => ToolOutcome::Product(Box::new(product)),
            None => ToolOutcome::NotFound(format!("Product with SKU {sku} not found.")),
        })
    }

    // ── Cart ────────────────────────────────────────────────

    async fn add_to_cart(&self, session: &mut Session, args: AddToCartArgs) -> ToolResult {
        if args.quantity == 0 {
            return Ok(ToolOutcome::Failure("Quantity must be at least 1.".to_string()));
        }
        let sku = match resolve_sku(session, &args.product) {
            Ok(sku) => sku,
            Err(outcome) => return Ok(outcome),
        };
        let Some(product) = self.store.product_by_sku(&sku).await? else {
            return Ok(ToolOutcome::Failure(format!("Product with SKU {sku} not found.")));
        };

        let in_cart = session.cart_line(&product.sku).map_or(0, |line| line.quantity);
        if product.stock == 0 {
            return Ok(ToolOutcome::Failure(format!("{} is out of stock.", product.name)));
        }
        if !product.has_stock(in_cart.saturating_add(args.quantity)) {
            let message = if in_cart > 0 {
                format!(
                    "Only {} units of {} available in stock, and {in_cart} are already in the cart.",
                    product.stock, product.name
                )
            } else {
                format!("Only {} units of {} available in stock.", product.stock, product.name)
            };
            return Ok(ToolOutcome::Failure(message));
        }

        session.add_to_cart(&product.sku, product.id, args.quantity, &product.name, product.price);
        Ok(ToolOutcome::CartChange {
            message: format!("Added {}x {} to your cart.", args.quantity, product.name),
            item_count: session.cart().len(),
            total: session.cart_total(),
        })
    }

    async fn update_cart_item(&self, session: &mut Session, args: UpdateCartArgs) -> ToolResult {
        let sku = match resolve_sku(session, &args.product) {
            Ok(sku) => sku,
            Err(outcome) => return Ok(outcome),
        };
        let Some(name) = session.cart_line(&sku).map(|line| line.name.clone()) else {
            return Ok(not_in_cart());
        };

        if args.quantity == 0 {
            session.remove_from_cart(&sku);
            return Ok(cart_change(session, format!("Removed {name} from your cart.")));
        }

        Ok(match self.store.product_by_sku(&sku).await? {
            None => ToolOutcome::Failure(format!("{name} is no longer available.")),
            Some(product) if !product.has_stock(args.quantity) => {
                ToolOutcome::Failure(format!("Only {} units available.", product.stock))
            }
            Some(_) => {
                session.update_cart_item(&sku, args.quantity);
                cart_change(session, format!("Updated quantity to {}.", args.quantity))
            }
        })
    }

    // ── Orders ──────────────────────────────────────────────

    async fn order_info(&self, args: OrderInfoArgs) -> ToolResult {
        let id = OrderId::normalize(&args.order_id);
        Ok(match self.store.order_with_items(&id).await? {
            Some(detail) => ToolOutcome::Order(Box::new(detail)),
            None => ToolOutcome::NotFound(format!("No order found with ID {}.", args.order_id.trim())),
        })
    }
}

/// SKU from the explicit argument, else from a reference into the last listing.
fn resolve_sku(session: &Session, product: &ProductRef) -> Result<String, ToolOutcome> {
    let non_blank = |value: Option<&str>| {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    if let Some(sku) = non_blank(product.sku.as_deref()) {
        return Ok(sku);
    }
    match non_blank(product.reference.as_deref()) {
        Some(reference) => session
            .resolve_reference(&reference)
            .map(|shown| shown.sku.clone())
            .ok_or_else(|| {
                ToolOutcome::Failure(format!(
                    "Could not tell which product \"{reference}\" refers to. Ask the user to clarify."
                ))
            }),
        None => Err(ToolOutcome::Failure(
            "Provide a SKU or a reference to a product shown earlier.".to_string(),
        )),
    }
}

fn knowledge(args: KnowledgeArgs) -> ToolOutcome {
    ToolOutcome::Knowledge {
        topic: args.topic,
        skin_type: args.skin_type,
        concern: args.concern,
    }
}

fn update_profile(session: &mut Session, args: &ProfileArgs) -> ToolOutcome {
    let skin_type = args.skin_type.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let has_concern = args.concerns.iter().any(|c| !c.trim().is_empty());
    if skin_type.is_none() && !has_concern {
        return ToolOutcome::Failure("No profile fields given. Provide skinType or concerns.".to_string());
    }
    session.update_profile(skin_type, &args.concerns);
    ToolOutcome::Profile(session.profile().clone())
}

fn remove_from_cart(session: &mut Session, product: &ProductRef) -> ToolOutcome {
    let sku = match resolve_sku(session, product) {
        Ok(sku) => sku,
        Err(outcome) => return outcome,
    };
    match session.remove_from_cart(&sku) {
        Some(line) => cart_change(session, format!("Removed {} from your cart.", line.name)),
        None => not_in_cart(),
    }
}

fn initiate_order(session: &Session) -> ToolOutcome {
    let cart = CartSummary::of(session);
    if cart.is_empty() {
        return ToolOutcome::Failure(
            "Your cart is empty. Add some products before placing an order.".to_string(),
        );
    }
    ToolOutcome::Checkout(cart)
}

fn cart_change(session: &Session, message: String) -> ToolOutcome {
    ToolOutcome::CartChange {
        message,
        item_count: session.cart().len(),
        total: session.cart_total(),
    }
}

fn not_in_cart() -> ToolOutcome {
    ToolOutcome::Failure("That product is not in your cart.".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rust_decimal::Decimal;

    use skin_edit_core::{Price, ProductId};

    use super::*;
    use crate::db::InMemoryStore;
    use crate::session::ConnectionId;
    use crate::test_support::seeded_store;

    fn session() -> Session {
        Session::new(ConnectionId::new())
    }

    async fn run(store: &InMemoryStore, session: &mut Session, name: &str, args: &str) -> ToolOutcome {
        let tool = Tool::parse(name, args).unwrap();
        ToolExecutor::new(store).execute(session, tool).await
    }

    fn search(outcome: ToolOutcome) -> SearchResult {
        match outcome {
            ToolOutcome::Search(result) => result,
            other => panic!("expected search result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_pages_through_results() {
        let store = seeded_store().await;
        let mut session = session();

        let first = search(run(&store, &mut session, "searchProducts", r#"{"category":"Serum"}"#).await);
        assert_eq!(first.products.len(), 8);
        assert_eq!(first.total, 10);
        assert_eq!(first.page, 1);
        assert!(first.has_more);
        assert_eq!(session.last_shown().len(), 8);

        let second = search(run(&store, &mut session, "searchProducts", r#"{"category":"serum "}"#).await);
        assert_eq!(second.products.len(), 2);
        assert_eq!(second.page, 2);
        assert_eq!(second.shown, 10);
        assert!(!second.has_more);
        for product in &second.products {
            assert!(!first.products.iter().any(|p| p.id == product.id));
        }
        assert_eq!(session.last_shown().len(), 2);
        assert_eq!(session.last_shown()[0].position, 1);

        let third = search(run(&store, &mut session, "searchProducts", r#"{"category":"Serum"}"#).await);
        assert!(third.products.is_empty());
        assert_eq!(third.total, 10);
        assert_eq!(session.last_shown().len(), 2);
    }

    #[tokio::test]
    async fn test_changed_filters_reset_cursor() {
        let store = seeded_store().await;
        let mut session = session();

        run(&store, &mut session, "searchProducts", r#"{"category":"Serum"}"#).await;
        let other = search(
            run(&store, &mut session, "searchProducts", r#"{"category":"Serum","maxPrice":13000}"#).await,
        );
        assert_eq!(other.page, 1);
        assert_eq!(other.total, 3);

        let back = search(run(&store, &mut session, "searchProducts", r#"{"category":"Serum"}"#).await);
        assert_eq!(back.page, 1);
        assert_eq!(back.products.len(), 8);
    }

    #[tokio::test]
    async fn test_search_relaxes_category_then_filters() {
        let store = seeded_store().await;
        let mut session = session();

        let relaxed = search(
            run(&store, &mut session, "searchProducts", r#"{"category":"Mask","concern":"dryness"}"#).await,
        );
        assert_eq!(relaxed.tier, SearchTier::WithoutCategory);
        assert_eq!(relaxed.products.len(), 1);
        assert_eq!(relaxed.products[0].sku, "CL-001");

        let broad = search(
            run(&store, &mut session, "searchProducts", r#"{"query":"toner","brand":"Nobody"}"#).await,
        );
        assert_eq!(broad.tier, SearchTier::Broad);
        assert_eq!(broad.products[0].sku, "TN-001");

        let nothing = search(run(&store, &mut session, "searchProducts", r#"{"query":"sunscreen"}"#).await);
        assert_eq!(nothing.total, 0);
        assert!(nothing.products.is_empty());
        let payload = ToolOutcome::Search(nothing).to_model_payload();
        assert_eq!(payload["found"], false);
    }

    #[tokio::test]
    async fn test_add_to_cart_by_reference() {
        let store = seeded_store().await;
        let mut session = session();

        run(&store, &mut session, "searchProducts", r#"{"category":"Serum"}"#).await;
        let outcome = run(&store, &mut session, "addToCart", r#"{"reference":"the second one","quantity":2}"#).await;

        assert!(matches!(outcome, ToolOutcome::CartChange { item_count: 1, .. }));
        let line = &session.cart()[0];
        assert_eq!(line.sku, "SE-002");
        assert_eq!(line.quantity, 2);
        assert_eq!(session.cart_total(), Price::new(Decimal::new(24_000, 0)));
    }

    #[tokio::test]
    async fn test_unresolved_reference_is_refused() {
        let store = seeded_store().await;
        let mut session = session();
        let outcome = run(&store, &mut session, "addToCart", r#"{"reference":"that one"}"#).await;
        assert!(matches!(outcome, ToolOutcome::Failure(_)));
        assert!(session.cart().is_empty());
    }

    #[tokio::test]
    async fn test_add_to_cart_never_oversells() {
        let store = seeded_store().await;
        let mut session = session();

        let too_many = run(&store, &mut session, "addToCart", r#"{"sku":"TN-001","quantity":2}"#).await;
        assert_eq!(
            too_many,
            ToolOutcome::Failure("Only 1 units of Rose Toner available in stock.".to_string())
        );
        assert!(session.cart().is_empty());

        let ok = run(&store, &mut session, "addToCart", r#"{"sku":"TN-001"}"#).await;
        assert!(matches!(ok, ToolOutcome::CartChange { .. }));

        let again = run(&store, &mut session, "addToCart", r#"{"sku":"TN-001"}"#).await;
        assert!(matches!(again, ToolOutcome::Failure(_)));
        assert_eq!(session.cart()[0].quantity, 1);

        let sold_out = run(&store, &mut session, "addToCart", r#"{"sku":"SE-010"}"#).await;
        assert_eq!(sold_out, ToolOutcome::Failure("Lumen Serum 10 is out of stock.".to_string()));
    }

    #[tokio::test]
    async fn test_add_unknown_sku() {
        let store = seeded_store().await;
        let mut session = session();
        let outcome = run(&store, &mut session, "addToCart", r#"{"sku":"XX-999"}"#).await;
        assert_eq!(outcome, ToolOutcome::Failure("Product with SKU XX-999 not found.".to_string()));
    }

    #[tokio::test]
    async fn test_update_cart_item_checks_stock() {
        let store = seeded_store().await;
        let mut session = session();
        run(&store, &mut session, "addToCart", r#"{"sku":"CL-001"}"#).await;

        let over = run(&store, &mut session, "updateCartItem", r#"{"sku":"CL-001","quantity":4}"#).await;
        assert_eq!(over, ToolOutcome::Failure("Only 3 units available.".to_string()));
        assert_eq!(session.cart()[0].quantity, 1);

        let ok = run(&store, &mut session, "updateCartItem", r#"{"sku":"CL-001","quantity":3}"#).await;
        assert!(matches!(ok, ToolOutcome::CartChange { .. }));
        assert_eq!(session.cart()[0].quantity, 3);

        let zero = run(&store, &mut session, "updateCartItem", r#"{"sku":"CL-001","quantity":0}"#).await;
        assert!(matches!(zero, ToolOutcome::CartChange { item_count: 0, .. }));
        assert!(session.cart().is_empty());
    }

    #[tokio::test]
    async fn test_cart_changes_require_line() {
        let store = seeded_store().await;
        let mut session = session();

        let remove = run(&store, &mut session, "removeFromCart", r#"{"sku":"SE-001"}"#).await;
        assert_eq!(remove, ToolOutcome::Failure("That product is not in your cart.".to_string()));

        let update = run(&store, &mut session, "updateCartItem", r#"{"sku":"SE-001","quantity":2}"#).await;
        assert_eq!(update, ToolOutcome::Failure("That product is not in your cart.".to_string()));
    }

    #[tokio::test]
    async fn test_initiate_order_requires_items() {
        let store = seeded_store().await;
        let mut session = session();

        let empty = run(&store, &mut session, "initiateOrder", "{}").await;
        assert!(matches!(empty, ToolOutcome::Failure(_)));

        run(&store, &mut session, "addToCart", r#"{"sku":"SE-001"}"#).await;
        let checkout = run(&store, &mut session, "initiateOrder", "").await;
        assert!(checkout.is_checkout());
    }

    #[tokio::test]
    async fn test_profile_update() {
        let store = seeded_store().await;
        let mut session = session();

        let empty = run(&store, &mut session, "updateUserProfile", r#"{"concerns":[" "]}"#).await;
        assert!(matches!(empty, ToolOutcome::Failure(_)));

        let outcome =
            run(&store, &mut session, "updateUserProfile", r#"{"skinType":"Oily","concerns":["Acne"]}"#).await;
        let ToolOutcome::Profile(profile) = outcome else {
            panic!("expected profile");
        };
        assert_eq!(profile.skin_type.as_deref(), Some("Oily"));
        assert_eq!(profile.concerns, vec!["acne"]);
    }

    #[tokio::test]
    async fn test_lookups_not_found() {
        let store = seeded_store().await;
        let mut session = session();

        let product = run(&store, &mut session, "getProductDetail", r#"{"productId":99}"#).await;
        assert_eq!(product, ToolOutcome::NotFound("Product with ID 99 not found.".to_string()));

        let order = run(&store, &mut session, "getOrderInfo", r#"{"orderId":"zz99zz99"}"#).await;
        assert_eq!(order, ToolOutcome::NotFound("No order found with ID zz99zz99.".to_string()));

        let found = run(&store, &mut session, "getProductDetail", r#"{"productId":11}"#).await;
        let ToolOutcome::Product(product) = found else {
            panic!("expected product");
        };
        assert_eq!(product.id, ProductId::new(11));
    }

    #[tokio::test]
    async fn test_knowledge_needs_no_store() {
        let store = InMemoryStore::new();
        let mut session = session();
        let outcome = run(&store, &mut session, "getSkincareKnowledge", r#"{"topic":"double cleansing"}"#).await;
        assert!(matches!(outcome, ToolOutcome::Knowledge { .. }));
    }
}
