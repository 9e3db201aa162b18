use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::catalog::{self, AppState};
use crate::services::Catalog;

/// Create the admin router over a shared catalog
pub fn create_router(catalog: Arc<Catalog>) -> Router {
    let state = AppState { catalog };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/tables", get(catalog::list_tables))
        .route("/api/tables/{name}", get(catalog::get_table))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
