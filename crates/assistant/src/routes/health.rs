//! Health and session endpoints.

use axum::{Json, extract::State, http::StatusCode};

use crate::session::RegistryStats;
use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the data store is not reachable.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Live chat session counts.
pub async fn sessions(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.sessions().stats())
}
