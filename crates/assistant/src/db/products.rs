//! Database operations for the product catalog.
//!
//! Search is assembled with `QueryBuilder` because the filter set is dynamic;
//! the remaining queries use runtime-checked `query_as` with row structs.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use skin_edit_core::{Price, ProductId};

use super::{RepositoryError, like_pattern};
use crate::models::{NewProduct, Product, SearchFilters, SearchPage, SearchQuery};

const PRODUCT_COLUMNS: &str = "p.id, p.sku, p.name, p.brand, p.category, p.price, p.stock, \
     p.description, p.ingredients, p.volume, p.skin_types, p.concerns, p.image_filename";

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for `PostgreSQL` product queries.
#[derive(Debug, sqlx::FromRow)]
pub(super) struct ProductRow {
    id: i32,
    sku: String,
    name: String,
    brand: String,
    category: String,
    price: Decimal,
    stock: i32,
    description: String,
    ingredients: String,
    volume: Option<String>,
    skin_types: Vec<String>,
    concerns: Vec<String>,
    image_filename: Option<String>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let stock = u32::try_from(row.stock).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "negative stock {} for product {}",
                row.stock, row.sku
            ))
        })?;

        Ok(Self {
            id: ProductId::new(row.id),
            sku: row.sku,
            name: row.name,
            brand: row.brand,
            category: row.category,
            price: Price::new(row.price),
            stock,
            description: row.description,
            ingredients: row.ingredients,
            volume: row.volume,
            skin_types: row.skin_types,
            concerns: row.concerns,
            image_filename: row.image_filename,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a product by SKU (exact, case-sensitive).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.sku = $1"
        ))
        .bind(sku)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// List every product, ordered by category then name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p ORDER BY p.category, p.name"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Search the catalog.
    ///
    /// Results are ordered by units sold (descending), then by id. `total`
    /// counts every match for the filters, including excluded ids.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchPage, RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p WHERE TRUE");
        push_filters(&mut count, &query.filters);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p \
             LEFT JOIN order_items oi ON oi.product_id = p.id WHERE TRUE"
        ));
        push_filters(&mut select, &query.filters);
        if !query.exclude.is_empty() {
            let excluded: Vec<i32> = query.exclude.iter().map(ProductId::as_i32).collect();
            select.push(" AND NOT (p.id = ANY(");
            select.push_bind(excluded);
            select.push("))");
        }
        select.push(" GROUP BY p.id ORDER BY COALESCE(SUM(oi.quantity), 0) DESC, p.id LIMIT ");
        select.push_bind(i64::from(query.limit));

        let rows: Vec<ProductRow> = select.build_query_as().fetch_all(self.pool).await?;
        let products = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SearchPage {
            products,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    /// Insert a product, or update every field of the product with the same SKU.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let stock = i32::try_from(product.stock).map_err(|_| {
            RepositoryError::Conflict(format!("stock for {} is out of range", product.sku))
        })?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            INSERT INTO products AS p (sku, name, brand, category, price, stock, description,
                                       ingredients, volume, skin_types, concerns, image_filename)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (sku) DO UPDATE SET
                name = EXCLUDED.name,
                brand = EXCLUDED.brand,
                category = EXCLUDED.category,
                price = EXCLUDED.price,
                stock = EXCLUDED.stock,
                description = EXCLUDED.description,
                ingredients = EXCLUDED.ingredients,
                volume = EXCLUDED.volume,
                skin_types = EXCLUDED.skin_types,
                concerns = EXCLUDED.concerns,
                image_filename = EXCLUDED.image_filename
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.category)
        .bind(product.price)
        .bind(stock)
        .bind(&product.description)
        .bind(&product.ingredients)
        .bind(&product.volume)
        .bind(&product.skin_types)
        .bind(&product.concerns)
        .bind(&product.image_filename)
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }
}

/// Append `AND ...` clauses for every set filter.
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &SearchFilters) {
    if let Some(query) = &filters.query {
        let pattern = like_pattern(query);
        builder.push(" AND (");
        let mut fields = builder.separated(" OR ");
        for column in ["p.name", "p.brand", "p.category", "p.description", "p.sku"] {
            fields.push(format!("{column} ILIKE "));
            fields.push_bind_unseparated(pattern.clone());
        }
        builder.push(")");
    }
    if let Some(category) = &filters.category {
        builder.push(" AND p.category ILIKE ");
        builder.push_bind(like_pattern(category));
    }
    if let Some(brand) = &filters.brand {
        builder.push(" AND p.brand ILIKE ");
        builder.push_bind(like_pattern(brand));
    }
    if let Some(skin_type) = &filters.skin_type {
        builder.push(" AND array_to_string(p.skin_types, ',') ILIKE ");
        builder.push_bind(like_pattern(skin_type));
    }
    if let Some(concern) = &filters.concern {
        builder.push(" AND array_to_string(p.concerns, ',') ILIKE ");
        builder.push_bind(like_pattern(concern));
    }
    if let Some(max_price) = filters.max_price {
        builder.push(" AND p.price <= ");
        builder.push_bind(max_price);
    }
}
