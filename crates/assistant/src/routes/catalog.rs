//! Catalog API handlers.

use std::collections::BTreeSet;

use axum::{Json, extract::State};

use crate::error::Result;
use crate::models::Product;
use crate::state::AppState;

/// Every product, ordered by category then name.
pub async fn products(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.store().list_products().await?))
}

/// Distinct categories, sorted.
pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    let products = state.store().list_products().await?;
    Ok(Json(distinct(products.into_iter().map(|p| p.category))))
}

/// Distinct skin types, sorted.
pub async fn skin_types(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    let products = state.store().list_products().await?;
    Ok(Json(distinct(
        products.into_iter().flat_map(|p| p.skin_types),
    )))
}

fn distinct(values: impl Iterator<Item = String>) -> Vec<String> {
    values
        .filter(|value| !value.trim().is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
