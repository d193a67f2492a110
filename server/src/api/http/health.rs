//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::infra::registry::RegistryStats;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub host_connected: bool,
    pub stats: RegistryStats,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        host_connected: state.registry.host_session().is_some(),
        stats: state.registry.stats(),
    })
}
