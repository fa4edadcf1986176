//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::connection_manager::ConnectionStats;
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_connections: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_connections: state.connection_manager.active_count(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<ConnectionStats> {
    Json(state.connection_manager.stats())
}
