//! Liveness endpoints. Not wrapped by the request trace layer.

use crate::table::ToolTable;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct HealthBody {
    pub status: &'static str,
    pub service: String,
    pub tools_registered: usize,
}

pub fn router(table: Arc<ToolTable>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .with_state(table)
}

async fn health(State(table): State<Arc<ToolTable>>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "healthy",
        service: table.service_name().to_string(),
        tools_registered: table.len(),
    })
}
