//! HTTP API handlers

mod health;
mod sessions;
mod ws;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Session diagnostics
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/{id}", get(sessions::get_session));

    Router::new()
        .nest("/api/v1", api_routes)
        // WebSocket channels
        .route("/ws", get(ws::channel_websocket))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
