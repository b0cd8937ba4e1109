//! In-memory [`CommerceStore`] for tests and local experiments.
//!
//! One mutex guards the whole catalog and order book, so placement and
//! status changes are atomic just like the database transactions.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use skin_edit_core::{OrderId, OrderStatus, Price, ProductId};

use super::{CommerceStore, PlaceOrderOutcome, RepositoryError, StatusChange, StockIssue, StockProblem};
use crate::models::{
    NewOrder, NewProduct, Order, OrderDetail, OrderItem, OrderSummary, Product, SearchPage,
    SearchQuery,
};

#[derive(Default)]
struct Inner {
    products: BTreeMap<ProductId, Product>,
    orders: Vec<OrderDetail>,
    next_product_id: i32,
}

impl Inner {
    fn by_sku(&self, sku: &str) -> Option<&Product> {
        self.products.values().find(|p| p.sku == sku)
    }

    /// Units sold per product across all orders.
    fn popularity(&self) -> HashMap<ProductId, u32> {
        let mut sold = HashMap::new();
        for item in self.orders.iter().flat_map(|o| &o.items) {
            *sold.entry(item.product_id).or_insert(0) += item.quantity;
        }
        sold
    }
}

/// Catalog and order book held in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a product, or replace the product with the same SKU.
    pub async fn upsert_product(&self, product: NewProduct) -> Product {
        let mut inner = self.inner.lock().await;
        let id = match inner.by_sku(&product.sku) {
            Some(existing) => existing.id,
            None => {
                inner.next_product_id += 1;
                ProductId::new(inner.next_product_id)
            }
        };

        let stored = Product {
            id,
            sku: product.sku,
            name: product.name,
            brand: product.brand,
            category: product.category,
            price: Price::new(product.price),
            stock: product.stock,
            description: product.description,
            ingredients: product.ingredients,
            volume: product.volume,
            skin_types: product.skin_types,
            concerns: product.concerns,
            image_filename: product.image_filename,
        };
        inner.products.insert(id, stored.clone());
        stored
    }

    /// Overwrite a product's stock. Returns `false` for an unknown SKU.
    pub async fn set_stock(&self, sku: &str, stock: u32) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.products.values_mut().find(|p| p.sku == sku) {
            Some(product) => {
                product.stock = stock;
                true
            }
            None => false,
        }
    }

    /// Remove a product from the catalog. Existing orders keep their lines.
    pub async fn remove_product(&self, sku: &str) -> Option<Product> {
        let mut inner = self.inner.lock().await;
        let id = inner.by_sku(sku)?.id;
        inner.products.remove(&id)
    }
}

#[async_trait]
impl CommerceStore for InMemoryStore {
    async fn product_by_sku(&self, sku: &str) -> Result<Option<Product>, RepositoryError> {
        Ok(self.inner.lock().await.by_sku(sku).cloned())
    }

    async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.inner.lock().await.products.get(&id).cloned())
    }

    async fn search_products(&self, query: &SearchQuery) -> Result<SearchPage, RepositoryError> {
        let inner = self.inner.lock().await;
        let sold = inner.popularity();

        let mut matches: Vec<&Product> = inner
            .products
            .values()
            .filter(|p| p.matches(&query.filters))
            .collect();
        let total = matches.len() as u64;

        matches.retain(|p| !query.exclude.contains(&p.id));
        matches.sort_by(|a, b| {
            let sold_a = sold.get(&a.id).copied().unwrap_or_default();
            let sold_b = sold.get(&b.id).copied().unwrap_or_default();
            sold_b.cmp(&sold_a).then(a.id.cmp(&b.id))
        });

        Ok(SearchPage {
            products: matches
                .into_iter()
                .take(query.limit as usize)
                .cloned()
                .collect(),
            total,
        })
    }

    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let inner = self.inner.lock().await;
        let mut products: Vec<Product> = inner.products.values().cloned().collect();
        products.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.name.cmp(&b.name)));
        Ok(products)
    }

    async fn place_order(&self, order: &NewOrder) -> Result<PlaceOrderOutcome, RepositoryError> {
        let mut inner = self.inner.lock().await;

        let mut issues = Vec::new();
        let mut resolved = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            let problem = match inner.by_sku(&line.sku) {
                None => Some(StockProblem::Missing),
                Some(product) if product.stock == 0 => Some(StockProblem::SoldOut),
                Some(product) if product.stock < line.quantity => Some(StockProblem::Insufficient {
                    available: product.stock,
                }),
                Some(product) => {
                    resolved.push((product.id, line));
                    None
                }
            };
            if let Some(problem) = problem {
                issues.push(StockIssue {
                    sku: line.sku.clone(),
                    name: line.name.clone(),
                    requested: line.quantity,
                    problem,
                });
            }
        }
        if !issues.is_empty() {
            return Ok(PlaceOrderOutcome::Rejected(issues));
        }

        let id = loop {
            let candidate = OrderId::generate();
            if !inner.orders.iter().any(|o| o.order.id == candidate) {
                break candidate;
            }
        };

        let mut items = Vec::with_capacity(resolved.len());
        for (product_id, line) in resolved {
            if let Some(product) = inner.products.get_mut(&product_id) {
                product.stock = product.stock.saturating_sub(line.quantity);
            }
            items.push(OrderItem {
                product_id,
                sku: line.sku.clone(),
                product_name: line.name.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
            });
        }

        let detail = OrderDetail {
            order: Order {
                id,
                customer_name: order.customer.name.clone(),
                phone: order.customer.phone.clone(),
                address: order.customer.address.clone(),
                status: OrderStatus::Pending,
                created_at: Utc::now(),
            },
            items,
        };
        inner.orders.push(detail.clone());
        Ok(PlaceOrderOutcome::Placed(detail))
    }

    async fn order_with_items(&self, id: &OrderId) -> Result<Option<OrderDetail>, RepositoryError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.iter().find(|o| &o.order.id == id).cloned())
    }

    async fn update_order_status(
        &self,
        id: &OrderId,
        status: OrderStatus,
    ) -> Result<StatusChange, RepositoryError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let Some(detail) = inner.orders.iter_mut().find(|o| &o.order.id == id) else {
            return Ok(StatusChange::NotFound);
        };

        let previous = detail.order.status;
        if !previous.can_transition_to(status) {
            return Ok(StatusChange::AlreadyRejected);
        }
        detail.order.status = status;

        if previous.restores_stock(status) {
            for item in &detail.items {
                if let Some(product) = inner.products.get_mut(&item.product_id) {
                    product.stock = product.stock.saturating_add(item.quantity);
                }
            }
        }

        Ok(StatusChange::Updated {
            previous,
            current: status,
        })
    }

    async fn search_orders(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<OrderSummary>, RepositoryError> {
        let inner = self.inner.lock().await;
        let needle = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut found: Vec<OrderSummary> = inner
            .orders
            .iter()
            .filter(|detail| {
                needle.as_ref().is_none_or(|needle| {
                    detail.order.customer_name.to_lowercase().contains(needle)
                        || detail.order.phone.contains(needle.as_str())
                        || detail.order.id.as_str().to_lowercase().contains(needle)
                })
            })
            .map(OrderSummary::from)
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}
