//! Catalog models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use skin_edit_core::{Price, ProductId};

/// A product in the store catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub price: Price,
    /// Units on hand. Never negative.
    pub stock: u32,
    pub description: String,
    pub ingredients: String,
    pub volume: Option<String>,
    pub skin_types: Vec<String>,
    pub concerns: Vec<String>,
    pub image_filename: Option<String>,
}

impl Product {
    /// Whether at least `quantity` units are on hand.
    #[must_use]
    pub const fn has_stock(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }

    /// Whether the product satisfies every filter in `filters` (AND semantics).
    ///
    /// Text filters are case-insensitive substring matches, mirroring the
    /// `ILIKE` queries of the database store.
    #[must_use]
    pub fn matches(&self, filters: &SearchFilters) -> bool {
        let contains = |haystack: &str, needle: &str| haystack.to_lowercase().contains(needle);

        if let Some(query) = &filters.query {
            let hit = [
                self.name.as_str(),
                self.brand.as_str(),
                self.category.as_str(),
                self.description.as_str(),
                self.sku.as_str(),
            ]
            .iter()
            .any(|field| contains(field, query));
            if !hit {
                return false;
            }
        }
        if let Some(category) = &filters.category
            && !contains(&self.category, category)
        {
            return false;
        }
        if let Some(brand) = &filters.brand
            && !contains(&self.brand, brand)
        {
            return false;
        }
        if let Some(skin_type) = &filters.skin_type
            && !contains(&self.skin_types.join(","), skin_type)
        {
            return false;
        }
        if let Some(concern) = &filters.concern
            && !contains(&self.concerns.join(","), concern)
        {
            return false;
        }
        if let Some(max_price) = filters.max_price
            && self.price.amount() > max_price
        {
            return false;
        }
        true
    }
}

/// A catalog entry as loaded from a seed file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    pub price: Decimal,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ingredients: String,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub skin_types: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub image_filename: Option<String>,
}

/// One line of the catalog overview rendered into the system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub sku: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub price: Price,
    pub skin_types: Vec<String>,
    pub in_stock: bool,
}

impl From<&Product> for CatalogEntry {
    fn from(product: &Product) -> Self {
        Self {
            sku: product.sku.clone(),
            name: product.name.clone(),
            brand: product.brand.clone(),
            category: product.category.clone(),
            price: product.price,
            skin_types: product.skin_types.clone(),
            in_stock: product.stock > 0,
        }
    }
}

/// Structured product search filters.
///
/// Compared structurally to decide whether a search continues the previous
/// page or starts over, so always build it through [`SearchFilters::normalized`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub query: Option<String>,
    pub category: Option<String>,
    pub skin_type: Option<String>,
    pub concern: Option<String>,
    pub brand: Option<String>,
    pub max_price: Option<Decimal>,
}

impl SearchFilters {
    /// Trim and lower-case every text filter, turning blank values into `None`.
    #[must_use]
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
        }

        Self {
            query: clean(self.query),
            category: clean(self.category),
            skin_type: clean(self.skin_type),
            concern: clean(self.concern),
            brand: clean(self.brand),
            max_price: self.max_price.map(|p| p.normalize()),
        }
    }

    /// Whether no filter is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.query.is_none()
            && self.category.is_none()
            && self.skin_type.is_none()
            && self.concern.is_none()
            && self.brand.is_none()
            && self.max_price.is_none()
    }

    /// The same filters with the category dropped.
    #[must_use]
    pub fn without_category(&self) -> Self {
        Self {
            category: None,
            ..self.clone()
        }
    }

    /// Only the free-text part. With no free text this is the empty filter
    /// set, which lists the whole catalog by popularity.
    #[must_use]
    pub fn free_text_only(&self) -> Self {
        Self {
            query: self.query.clone(),
            ..Self::default()
        }
    }
}

/// A page request against the catalog.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub filters: SearchFilters,
    /// Products already shown for this filter set.
    pub exclude: Vec<ProductId>,
    pub limit: u32,
}

/// One page of search results, ordered by popularity.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub products: Vec<Product>,
    /// Matches for the filters, ignoring `exclude`.
    pub total: u64,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn product(id: i32, sku: &str, name: &str, price: i64, stock: u32) -> Product {
        Product {
            id: ProductId::new(id),
            sku: sku.to_string(),
            name: name.to_string(),
            brand: "Lumen".to_string(),
            category: "Serum".to_string(),
            price: Price::new(Decimal::new(price, 0)),
            stock,
            description: format!("{name} for daily use."),
            ingredients: "Water, Glycerin".to_string(),
            volume: Some("30ml".to_string()),
            skin_types: vec!["Oily".to_string(), "Combination".to_string()],
            concerns: vec!["acne".to_string()],
            image_filename: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::product;
    use super::*;

    #[test]
    fn test_filters_normalized() {
        let filters = SearchFilters {
            query: Some("  Vitamin C ".to_string()),
            category: Some("   ".to_string()),
            brand: Some("LUMEN".to_string()),
            ..SearchFilters::default()
        }
        .normalized();

        assert_eq!(filters.query.as_deref(), Some("vitamin c"));
        assert_eq!(filters.category, None);
        assert_eq!(filters.brand.as_deref(), Some("lumen"));
    }

    #[test]
    fn test_filters_structural_equality_ignores_spelling_noise() {
        let a = SearchFilters {
            skin_type: Some("Oily".to_string()),
            max_price: Some(Decimal::new(30_000, 0)),
            ..SearchFilters::default()
        }
        .normalized();
        let b = SearchFilters {
            skin_type: Some(" oily".to_string()),
            max_price: Some(Decimal::new(3_000_000, 2)),
            ..SearchFilters::default()
        }
        .normalized();
        assert_eq!(a, b);
    }

    #[test]
    fn test_relaxations() {
        let filters = SearchFilters {
            query: Some("serum".to_string()),
            category: Some("serum".to_string()),
            concern: Some("acne".to_string()),
            ..SearchFilters::default()
        };
        assert_eq!(filters.without_category().category, None);
        assert_eq!(
            filters.without_category().concern.as_deref(),
            Some("acne")
        );
        let free = filters.free_text_only();
        assert_eq!(free.query.as_deref(), Some("serum"));
        assert!(free.concern.is_none());
        assert!(SearchFilters::default().free_text_only().is_empty());
    }

    #[test]
    fn test_matches_uses_and_semantics() {
        let serum = product(1, "SE-001", "Glow Serum", 25_000, 4);
        let matching = SearchFilters {
            skin_type: Some("oily".to_string()),
            concern: Some("acne".to_string()),
            max_price: Some(Decimal::new(30_000, 0)),
            ..SearchFilters::default()
        };
        assert!(serum.matches(&matching));

        let too_cheap = SearchFilters {
            max_price: Some(Decimal::new(20_000, 0)),
            ..matching.clone()
        };
        assert!(!serum.matches(&too_cheap));

        let wrong_type = SearchFilters {
            skin_type: Some("dry".to_string()),
            ..matching
        };
        assert!(!serum.matches(&wrong_type));
    }

    #[test]
    fn test_catalog_entry_stock_status() {
        let sold_out = product(2, "SE-002", "Night Cream", 30_000, 0);
        assert!(!CatalogEntry::from(&sold_out).in_stock);
    }
}
