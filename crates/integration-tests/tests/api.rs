//! JSON API served over a real socket, backed by the in-memory store.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use skin_edit_assistant::db::{CommerceStore, InMemoryStore, PlaceOrderOutcome};
use skin_edit_assistant::models::{CustomerInfo, NewOrder, NewOrderLine};
use skin_edit_assistant::routes;
use skin_edit_assistant::state::AppState;
use skin_edit_integration_tests::{ScriptedGateway, catalog_store, fast_settings, renderer};

/// Serve the API on an ephemeral port.
async fn spawn_server() -> (SocketAddr, Arc<InMemoryStore>) {
    let store = Arc::new(catalog_store().await);
    let state = AppState::new(
        Arc::clone(&store) as Arc<dyn CommerceStore>,
        Arc::new(ScriptedGateway::new(Vec::new())),
        renderer(),
        fast_settings(),
    );
    let app = routes::routes().with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, store)
}

async fn place_order(store: &InMemoryStore, sku: &str, quantity: u32) -> String {
    let product = store.product_by_sku(sku).await.unwrap().unwrap();
    let order = NewOrder {
        customer: CustomerInfo {
            name: "Thiri".to_string(),
            phone: "09450000001".to_string(),
            address: "7 Bogyoke Road".to_string(),
        },
        lines: vec![NewOrderLine {
            product_id: product.id,
            sku: product.sku,
            name: product.name,
            quantity,
            unit_price: product.price,
        }],
    };
    match store.place_order(&order).await.unwrap() {
        PlaceOrderOutcome::Placed(detail) => detail.order.id.to_string(),
        PlaceOrderOutcome::Rejected(issues) => panic!("unexpected rejection: {issues:?}"),
    }
}

#[tokio::test]
async fn test_health_and_catalog() {
    let (addr, _) = spawn_server().await;
    let client = Client::new();

    let resp = client.get(format!("http://{addr}/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");

    let resp = client.get(format!("http://{addr}/health/ready")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let products: Value = client
        .get(format!("http://{addr}/api/products"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(products.as_array().unwrap().len(), 10);

    let categories: Value = client
        .get(format!("http://{addr}/api/categories"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        categories,
        json!(["Cleanser", "Mask", "Moisturizer", "Serum", "Sunscreen", "Toner"])
    );
}

#[tokio::test]
async fn test_order_status_lifecycle() {
    let (addr, store) = spawn_server().await;
    let client = Client::new();
    let id = place_order(&store, "MO-002", 3).await;
    assert_eq!(store.product_by_sku("MO-002").await.unwrap().unwrap().stock, 9);

    let detail: Value = client
        .get(format!("http://{addr}/api/orders/{id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["itemCount"], 3);
    assert_eq!(detail["items"][0]["subtotal"], "58500");

    let resp = client
        .patch(format!("http://{addr}/api/orders/{id}/status"))
        .json(&json!({ "status": "confirmed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .patch(format!("http://{addr}/api/orders/{id}/status"))
        .json(&json!({ "status": "rejected" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(store.product_by_sku("MO-002").await.unwrap().unwrap().stock, 12);

    let resp = client
        .patch(format!("http://{addr}/api/orders/{id}/status"))
        .json(&json!({ "status": "rejected" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Order is already rejected.");
    assert_eq!(store.product_by_sku("MO-002").await.unwrap().unwrap().stock, 12);

    let listing: Value = client
        .get(format!("http://{addr}/api/orders?search=thiri"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing[0]["status"], "rejected");
}
