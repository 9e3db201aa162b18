use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::TableSummary;
use crate::services::Catalog;

/// Admin API state
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
}

/// List every registered semantic table
pub async fn list_tables(State(state): State<AppState>) -> Json<serde_json::Value> {
    let tables = state.catalog.summaries();

    Json(serde_json::json!({
        "tables": tables
    }))
}

/// Describe one semantic table
pub async fn get_table(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TableSummary>, AppError> {
    tracing::debug!(table = %name, "Describing semantic table");

    let table = state
        .catalog
        .lookup(&name)
        .ok_or_else(|| AppError::NotFound(format!("Table {} not found", name)))?;

    Ok(Json(TableSummary::from_table(&name, table.as_ref())))
}
