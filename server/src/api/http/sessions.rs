//! Session diagnostics handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::infra::registry::SessionSummary;
use crate::{AppState, Error, Result};

/// List every registered session
pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.registry.sessions())
}

/// Get one session by id
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSummary>> {
    state
        .registry
        .sessions()
        .into_iter()
        .find(|summary| summary.id == id)
        .map(Json)
        .ok_or(Error::SessionNotFound(id))
}
