//! Tool backend that forwards calls to the hub

use std::sync::Arc;

use async_trait::async_trait;
use cmdbridge_common::protocol::{METHOD_TOOLS_CALL, TOOL_EXECUTE_COMMAND, TOOL_LIST_COMMANDS};
use cmdbridge_common::{CommandExecutionResult, ToolBackend};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::error::BridgeError;

/// Runs every tool call as a `tools/call` request on the hub channel
pub struct ChannelToolBackend {
    manager: Arc<ConnectionManager>,
}

impl ChannelToolBackend {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> CommandExecutionResult {
        debug!("Forwarding {} to the hub", name);
        let params = json!({ "name": name, "arguments": arguments });

        match self.manager.call(METHOD_TOOLS_CALL, params).await {
            Ok(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Hub returned a malformed result for {}: {}", name, e);
                CommandExecutionResult::err(format!("Malformed result from hub: {}", e))
            }),
            Err(e @ BridgeError::NotConnected) => CommandExecutionResult::err(format!(
                "{}; ensure the host extension is running",
                e
            )),
            Err(e) => {
                warn!("{} failed: {}", name, e);
                CommandExecutionResult::err(e.to_string())
            }
        }
    }
}

#[async_trait]
impl ToolBackend for ChannelToolBackend {
    async fn execute_command(&self, command_id: &str, args: Vec<Value>) -> CommandExecutionResult {
        self.call_tool(
            TOOL_EXECUTE_COMMAND,
            json!({ "commandId": command_id, "args": args }),
        )
        .await
    }

    async fn list_commands(&self, filter: Option<String>) -> CommandExecutionResult {
        let arguments = match filter {
            Some(filter) => json!({ "filter": filter }),
            None => json!({}),
        };
        self.call_tool(TOOL_LIST_COMMANDS, arguments).await
    }
}
