//! System prompt rendering.
//!
//! The prompt is rebuilt for every model turn from the session state and a
//! catalog overview. The overview is cached for a configurable TTL because it
//! is the same for every connection.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use askama::Template;
use moka::future::Cache;
use tracing::{debug, warn};

use skin_edit_core::Price;

use crate::db::CommerceStore;
use crate::models::CatalogEntry;
use crate::session::{CartLine, Session, ShownProduct, UserProfile};

/// Store name shown to the model.
pub const STORE_NAME: &str = "Skin Edit";

const FALLBACK_PROMPT: &str = "You are a helpful skincare shopping assistant. \
     Use the available tools to search products, manage the cart and place orders.";

#[derive(Template)]
#[template(path = "prompt/system_prompt.txt")]
struct SystemPromptTemplate<'a> {
    store_name: &'a str,
    categories: Vec<&'a str>,
    skin_types: Vec<&'a str>,
    brands: Vec<&'a str>,
    catalog: &'a [CatalogEntry],
    profile: &'a UserProfile,
    cart: &'a [CartLine],
    cart_total: Price,
    last_shown: &'a [ShownProduct],
    summary: Option<String>,
}

/// Builds the system prompt from session state.
#[derive(Clone)]
pub struct ContextRenderer {
    store_name: Arc<str>,
    catalog: Cache<(), Arc<Vec<CatalogEntry>>>,
}

impl ContextRenderer {
    #[must_use]
    pub fn new(store_name: &str, catalog_ttl: Duration) -> Self {
        let catalog = Cache::builder()
            .max_capacity(1)
            .time_to_live(catalog_ttl)
            .build();
        Self {
            store_name: Arc::from(store_name),
            catalog,
        }
    }

    /// Render the system prompt. Never fails: a catalog error renders an
    /// empty catalog and a template error yields a generic prompt.
    pub async fn render<S: CommerceStore + ?Sized>(&self, store: &S, session: &Session) -> String {
        let catalog = self.catalog(store).await;

        let template = SystemPromptTemplate {
            store_name: &self.store_name,
            categories: distinct(catalog.iter().map(|entry| entry.category.as_str())),
            skin_types: distinct(
                catalog
                    .iter()
                    .flat_map(|entry| entry.skin_types.iter().map(String::as_str)),
            ),
            brands: distinct(catalog.iter().map(|entry| entry.brand.as_str())),
            catalog: &catalog,
            profile: session.profile(),
            cart: session.cart(),
            cart_total: session.cart_total(),
            last_shown: session.last_shown(),
            summary: session.summary(),
        };

        template.render().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to render system prompt");
            FALLBACK_PROMPT.to_string()
        })
    }

    /// Drop the cached catalog, e.g. after stock changed.
    pub fn invalidate(&self) {
        self.catalog.invalidate_all();
    }

    async fn catalog<S: CommerceStore + ?Sized>(&self, store: &S) -> Arc<Vec<CatalogEntry>> {
        if let Some(entries) = self.catalog.get(&()).await {
            debug!("Cache hit for catalog overview");
            return entries;
        }

        match store.catalog_overview().await {
            Ok(entries) => {
                let entries = Arc::new(entries);
                self.catalog.insert((), Arc::clone(&entries)).await;
                entries
            }
            Err(e) => {
                warn!(error = %e, "Failed to load catalog overview");
                Arc::new(Vec::new())
            }
        }
    }
}

/// Sorted, de-duplicated, non-empty values.
fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    values
        .filter(|value| !value.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

impl std::fmt::Debug for ContextRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRenderer")
            .field("store_name", &self.store_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use skin_edit_core::{ChatRole, ProductId};

    use super::*;
    use crate::db::InMemoryStore;
    use crate::models::product::fixtures::product;
    use crate::session::ConnectionId;
    use crate::test_support::seeded_store;

    fn renderer() -> ContextRenderer {
        ContextRenderer::new(STORE_NAME, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_render_includes_catalog_and_vocabulary() {
        let store = seeded_store().await;
        let session = Session::new(ConnectionId::new());
        let prompt = renderer().render(&store, &session).await;

        assert!(prompt.contains("Skin Edit"));
        assert!(prompt.contains("- TN-001 | Rose Toner | Aqua | Toner | MMK 9000.00"));
        assert!(prompt.contains("SE-010 | Lumen Serum 10 | Lumen | Serum | MMK 20000.00 | OUT OF STOCK"));
        assert!(prompt.contains("Categories: Cleanser, Serum, Toner"));
        assert!(prompt.contains("Brands: Aqua, Lumen"));
        assert!(prompt.contains("Skin types: All Skin Types, Combination, Dry, Oily, Sensitive"));
        assert!(prompt.contains("Skin type: unknown"));
        assert!(!prompt.contains("Earlier in this conversation"));
    }

    #[tokio::test]
    async fn test_render_includes_session_state() {
        let store = seeded_store().await;
        let mut session = Session::new(ConnectionId::new());
        session.update_profile(Some("Dry"), &["Redness".to_string()]);
        session.add_to_cart("CL-001", ProductId::new(11), 2, "Gentle Foam Cleanser", Price::new(Decimal::new(12_000, 0)));
        session.set_last_shown(ShownProduct::listing(&[product(3, "SE-003", "Lumen Serum 3", 13_000, 5)]));
        for i in 0..12 {
            session.add_to_history(ChatRole::User, format!("message {i}"));
        }

        let prompt = renderer().render(&store, &session).await;
        assert!(prompt.contains("Skin type: Dry"));
        assert!(prompt.contains("Concerns: redness"));
        assert!(prompt.contains("- 2x Gentle Foam Cleanser (CL-001) at MMK 12000.00 each"));
        assert!(prompt.contains("Total: MMK 24000.00"));
        assert!(prompt.contains("1. Lumen Serum 3 (SE-003) MMK 13000.00"));
        assert!(prompt.contains("user: message 0"));
    }

    #[tokio::test]
    async fn test_catalog_is_cached_until_invalidated() {
        let store = seeded_store().await;
        let renderer = renderer();
        let session = Session::new(ConnectionId::new());

        renderer.render(&store, &session).await;
        store.remove_product("TN-001").await.unwrap();
        assert!(renderer.render(&store, &session).await.contains("TN-001"));

        renderer.invalidate();
        assert!(!renderer.render(&store, &session).await.contains("TN-001"));
    }

    #[tokio::test]
    async fn test_render_with_empty_store() {
        let store = InMemoryStore::new();
        let prompt = renderer().render(&store, &Session::new(ConnectionId::new())).await;
        assert!(prompt.contains("(catalog unavailable, use searchProducts)"));
        assert!(prompt.contains("(empty)"));
    }
}
