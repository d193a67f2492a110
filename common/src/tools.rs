//! MCP tool surface
//!
//! [`CommandToolsHandler`] exposes `vscode.executeCommand` and
//! `vscode.listCommands` to MCP clients. Where the commands actually run is
//! decided by the [`ToolBackend`] it is built with: the hub plugs in its
//! executor, the bridge plugs in a backend that forwards over a channel.

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ErrorData as McpError, ServerCapabilities, ServerInfo, Tool},
    schemars, tool, tool_handler, tool_router, ServerHandler,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::protocol::CommandExecutionResult;

/// Listing output shows at most this many command ids
pub const LIST_DISPLAY_LIMIT: usize = 20;

/// Where tool calls are carried out
#[async_trait]
pub trait ToolBackend: Send + Sync {
    async fn execute_command(&self, command_id: &str, args: Vec<Value>) -> CommandExecutionResult;

    async fn list_commands(&self, filter: Option<String>) -> CommandExecutionResult;
}

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCommandParams {
    /// Identifier of the command to run
    #[schemars(description = "The command identifier, e.g. editor.action.formatDocument")]
    pub command_id: String,

    /// Positional arguments passed to the command
    #[schemars(description = "Optional positional arguments for the command")]
    #[serde(default)]
    pub args: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize, schemars::JsonSchema)]
pub struct ListCommandsParams {
    /// Case-insensitive substring filter
    #[schemars(description = "Optional case-insensitive substring to filter command ids")]
    #[serde(default)]
    pub filter: Option<String>,
}

// ============================================================================
// Handler
// ============================================================================

#[derive(Clone)]
pub struct CommandToolsHandler {
    backend: Arc<dyn ToolBackend>,
    tool_router: ToolRouter<Self>,
}

impl CommandToolsHandler {
    pub fn new(backend: Arc<dyn ToolBackend>) -> Self {
        Self {
            backend,
            tool_router: Self::tool_router(),
        }
    }
}

/// Definitions of every tool, as reported by `tools/list`
pub fn tool_definitions() -> Vec<Tool> {
    CommandToolsHandler::tool_router().list_all()
}

#[tool_router]
impl CommandToolsHandler {
    #[tool(
        name = "vscode.executeCommand",
        description = "Execute an editor command by id with optional arguments. Returns the command's result."
    )]
    async fn execute_command(
        &self,
        Parameters(params): Parameters<ExecuteCommandParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("MCP: executeCommand {}", params.command_id);

        let result = self
            .backend
            .execute_command(&params.command_id, params.args.unwrap_or_default())
            .await;
        Ok(execution_to_tool_result(&params.command_id, &result))
    }

    #[tool(
        name = "vscode.listCommands",
        description = "List available editor commands, optionally filtered by a case-insensitive substring."
    )]
    async fn list_commands(
        &self,
        Parameters(params): Parameters<ListCommandsParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("MCP: listCommands (filter: {:?})", params.filter);

        let result = self.backend.list_commands(params.filter).await;
        Ok(listing_to_tool_result(&result))
    }
}

#[tool_handler]
impl ServerHandler for CommandToolsHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Editor command bridge. Use vscode.listCommands to discover command ids \
                and vscode.executeCommand to run one."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Formatting
// ============================================================================

fn execution_to_tool_result(command_id: &str, result: &CommandExecutionResult) -> CallToolResult {
    if !result.success {
        warn!("MCP: command {} failed: {}", command_id, result.error_message());
        return CallToolResult::error(vec![Content::text(format!(
            "Error: {}",
            result.error_message()
        ))]);
    }
    CallToolResult::success(vec![Content::text(format_execution(command_id, result))])
}

fn listing_to_tool_result(result: &CommandExecutionResult) -> CallToolResult {
    if !result.success {
        return CallToolResult::error(vec![Content::text(format!(
            "Error: {}",
            result.error_message()
        ))]);
    }
    CallToolResult::success(vec![Content::text(format_listing(result))])
}

/// Text for a successful command execution
pub fn format_execution(command_id: &str, result: &CommandExecutionResult) -> String {
    match result.result.as_ref() {
        None | Some(Value::Null) => format!("Command '{}' executed successfully", command_id),
        Some(Value::String(text)) => text.clone(),
        Some(value) => serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("Error serializing result: {}", e)),
    }
}

/// Text for a successful listing, truncated to [`LIST_DISPLAY_LIMIT`] ids
pub fn format_listing(result: &CommandExecutionResult) -> String {
    let commands: Vec<&str> = result
        .result
        .as_ref()
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if commands.is_empty() {
        return "No commands found".to_string();
    }

    let mut text = format!("Found {} commands:", commands.len());
    for command in commands.iter().take(LIST_DISPLAY_LIMIT) {
        text.push_str("\n- ");
        text.push_str(command);
    }
    if commands.len() > LIST_DISPLAY_LIMIT {
        text.push_str(&format!("\n... (+{} more)", commands.len() - LIST_DISPLAY_LIMIT));
    }
    text
}
