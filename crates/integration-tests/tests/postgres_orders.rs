//! Order placement and status changes against `PostgreSQL`.
//!
//! These tests require a running `PostgreSQL` database reachable through
//! `DATABASE_URL`. Migrations are applied on connect. Every test creates its
//! own products with unique SKUs, so runs do not interfere.
//!
//! Run with: cargo test -p skin-edit-integration-tests -- --ignored

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use rust_decimal::Decimal;
use secrecy::SecretString;
use sqlx::PgPool;
use uuid::Uuid;

use skin_edit_assistant::db::{
    self, CommerceStore, MIGRATOR, PgStore, PlaceOrderOutcome, StatusChange, StockProblem,
};
use skin_edit_assistant::models::{CustomerInfo, NewOrder, NewOrderLine, NewProduct, Product};
use skin_edit_core::{OrderId, OrderStatus};

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::create_pool(&SecretString::from(url))
        .await
        .expect("Failed to connect to database");
    MIGRATOR.run(&pool).await.expect("Failed to run migrations");
    pool
}

async fn create_product(pool: &PgPool, stock: u32) -> Product {
    let sku = format!("IT-{}", &Uuid::new_v4().simple().to_string()[..10]).to_uppercase();
    db::ProductRepository::new(pool)
        .upsert(&NewProduct {
            sku: sku.clone(),
            name: format!("Test Serum {sku}"),
            brand: "Lumen".to_string(),
            category: "Serum".to_string(),
            price: Decimal::new(15_000, 0),
            stock,
            description: String::new(),
            ingredients: String::new(),
            volume: None,
            skin_types: vec!["Oily".to_string()],
            concerns: vec!["acne".to_string()],
            image_filename: None,
        })
        .await
        .unwrap()
}

fn order_for(product: &Product, customer: &str, quantity: u32) -> NewOrder {
    NewOrder {
        customer: CustomerInfo {
            name: customer.to_string(),
            phone: "09123456789".to_string(),
            address: "1 Test Street".to_string(),
        },
        lines: vec![NewOrderLine {
            product_id: product.id,
            sku: product.sku.clone(),
            name: product.name.clone(),
            quantity,
            unit_price: product.price,
        }],
    }
}

async fn stock_of(store: &PgStore, sku: &str) -> u32 {
    store.product_by_sku(sku).await.unwrap().unwrap().stock
}

#[tokio::test]
#[ignore = "Requires running PostgreSQL database"]
async fn test_concurrent_finalize_sells_last_unit_once() {
    let pool = test_pool().await;
    let store = PgStore::new(pool.clone());
    let product = create_product(&pool, 1).await;

    let first_order = order_for(&product, "First Buyer", 1);
    let second_order = order_for(&product, "Second Buyer", 1);
    let (first, second) = tokio::join!(
        store.place_order(&first_order),
        store.place_order(&second_order),
    );
    let outcomes = [first.unwrap(), second.unwrap()];

    let placed = outcomes
        .iter()
        .filter(|o| matches!(o, PlaceOrderOutcome::Placed(_)))
        .count();
    assert_eq!(placed, 1);

    let rejected: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match o {
            PlaceOrderOutcome::Rejected(issues) => Some(issues),
            PlaceOrderOutcome::Placed(_) => None,
        })
        .collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0][0].sku, product.sku);
    assert_eq!(rejected[0][0].problem, StockProblem::SoldOut);

    assert_eq!(stock_of(&store, &product.sku).await, 0);
}

#[tokio::test]
#[ignore = "Requires running PostgreSQL database"]
async fn test_rejected_order_writes_nothing() {
    let pool = test_pool().await;
    let store = PgStore::new(pool.clone());
    let plenty = create_product(&pool, 10).await;
    let scarce = create_product(&pool, 1).await;

    let mut order = order_for(&plenty, "Mixed Cart", 2);
    order.lines.extend(order_for(&scarce, "Mixed Cart", 3).lines);

    match store.place_order(&order).await.unwrap() {
        PlaceOrderOutcome::Rejected(issues) => {
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].problem, StockProblem::Insufficient { available: 1 });
        }
        PlaceOrderOutcome::Placed(detail) => panic!("unexpected order {}", detail.order.id),
    }

    assert_eq!(stock_of(&store, &plenty.sku).await, 10);
    assert_eq!(stock_of(&store, &scarce.sku).await, 1);
}

#[tokio::test]
#[ignore = "Requires running PostgreSQL database"]
async fn test_reject_restores_stock_once() {
    let pool = test_pool().await;
    let store = PgStore::new(pool.clone());
    let product = create_product(&pool, 5).await;

    let PlaceOrderOutcome::Placed(detail) = store
        .place_order(&order_for(&product, "Restock Check", 2))
        .await
        .unwrap()
    else {
        panic!("order should be placed");
    };
    let id = detail.order.id.clone();
    assert_eq!(id.as_str().len(), 8);
    assert_eq!(stock_of(&store, &product.sku).await, 3);

    let change = store
        .update_order_status(&id, OrderStatus::Rejected)
        .await
        .unwrap();
    assert_eq!(
        change,
        StatusChange::Updated {
            previous: OrderStatus::Pending,
            current: OrderStatus::Rejected,
        }
    );
    assert_eq!(stock_of(&store, &product.sku).await, 5);

    let again = store
        .update_order_status(&id, OrderStatus::Rejected)
        .await
        .unwrap();
    assert_eq!(again, StatusChange::AlreadyRejected);
    assert_eq!(stock_of(&store, &product.sku).await, 5);

    let stored = store
        .order_with_items(&OrderId::normalize(&id.as_str().to_lowercase()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.order.status, OrderStatus::Rejected);
    assert_eq!(stored.items[0].quantity, 2);
}

fn order_for_both(first: &Product, second: &Product, customer: &str, quantity: u32) -> NewOrder {
    let mut order = order_for(second, customer, quantity);
    order.lines.insert(0, order_for(first, customer, quantity).lines.remove(0));
    order
}

#[tokio::test]
#[ignore = "Requires running PostgreSQL database"]
async fn test_reject_and_place_on_shared_products_both_commit() {
    let pool = test_pool().await;
    let store = PgStore::new(pool.clone());
    let first = create_product(&pool, 100).await;
    let second = create_product(&pool, 100).await;

    for round in 0..20 {
        let PlaceOrderOutcome::Placed(earlier) = store
            .place_order(&order_for_both(&first, &second, "Earlier Buyer", 2))
            .await
            .unwrap()
        else {
            panic!("round {round}: earlier order should be placed");
        };

        // Lines listed in the opposite order.
        let later = order_for_both(&second, &first, "Later Buyer", 1);
        let (rejected, placed) = tokio::join!(
            store.update_order_status(&earlier.order.id, OrderStatus::Rejected),
            store.place_order(&later),
        );

        assert!(matches!(rejected.unwrap(), StatusChange::Updated { .. }));
        assert!(matches!(placed.unwrap(), PlaceOrderOutcome::Placed(_)));
    }

    assert_eq!(stock_of(&store, &first.sku).await, 80);
    assert_eq!(stock_of(&store, &second.sku).await, 80);
}

#[tokio::test]
#[ignore = "Requires running PostgreSQL database"]
async fn test_search_finds_new_product() {
    let pool = test_pool().await;
    let store = PgStore::new(pool.clone());
    let product = create_product(&pool, 4).await;

    let found = store
        .search_products(&skin_edit_assistant::models::SearchQuery {
            filters: skin_edit_assistant::models::SearchFilters {
                query: Some(product.sku.to_lowercase()),
                ..Default::default()
            }
            .normalized(),
            exclude: Vec::new(),
            limit: 8,
        })
        .await
        .unwrap();
    assert_eq!(found.total, 1);
    assert_eq!(found.products[0].sku, product.sku);
}
