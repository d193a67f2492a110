//! MCP (Model Context Protocol) API layer
//!
//! Serves the command tools directly from the hub, backed by the local
//! tool executor. Bridges reach the same tools over channel sessions.

use std::sync::Arc;

use cmdbridge_common::CommandToolsHandler;
use rmcp::transport::stdio;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use rmcp::ServiceExt;
use tracing::info;

use crate::AppState;

fn handler(state: &AppState) -> CommandToolsHandler {
    CommandToolsHandler::new(state.executor.clone())
}

/// Start MCP server in stdio mode
///
/// Runs until the MCP client closes stdin.
pub async fn serve_stdio(state: AppState) -> anyhow::Result<()> {
    info!("Starting MCP server in stdio mode");

    let service = handler(&state).serve(stdio()).await?;

    info!("MCP server ready, waiting for requests...");
    service.waiting().await?;

    info!("MCP server shutdown");
    Ok(())
}

/// Streamable HTTP MCP service, nested by the caller under the configured path
pub fn create_mcp_service(
    state: AppState,
) -> StreamableHttpService<CommandToolsHandler, LocalSessionManager> {
    let handler = handler(&state);
    StreamableHttpService::new(
        move || Ok(handler.clone()),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig::default(),
    )
}
