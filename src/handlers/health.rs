//! Liveness and health endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::db;
use crate::repository::Store;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: String,
    pub version: &'static str,
}

pub async fn root() -> &'static str {
    "HSF Backend API Server"
}

pub async fn health_check<S: Store>(State(state): State<AppState<S>>) -> Json<HealthResponse> {
    let database = match &state.db_pool {
        Some(pool) => match db::check_health(pool).await {
            Ok(()) => "connected".to_string(),
            Err(e) => format!("error: {}", e),
        },
        None => "in-memory".to_string(),
    };

    let status = if database.starts_with("error") {
        "unhealthy"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status,
        database,
        version: env!("CARGO_PKG_VERSION"),
    })
}
