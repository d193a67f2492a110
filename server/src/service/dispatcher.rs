//! JSON-RPC request dispatcher
//!
//! Answers the MCP requests that arrive in `request` frames. Every request
//! produces exactly one response; failures become JSON-RPC error objects.

use std::sync::Arc;

use cmdbridge_common::protocol::{
    JsonRpcRequest, JsonRpcResponse, MessageKind, TransportMessage, JSONRPC_VERSION,
    MCP_PROTOCOL_VERSION, METHOD_INITIALIZE, METHOD_PING, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    TOOL_EXECUTE_COMMAND, TOOL_LIST_COMMANDS,
};
use cmdbridge_common::tools::{tool_definitions, ExecuteCommandParams, ListCommandsParams};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::executor::ToolExecutor;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub struct Dispatcher {
    executor: Arc<ToolExecutor>,
}

impl Dispatcher {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self { executor }
    }

    /// Answer a `request` frame with the matching `response` frame
    pub async fn handle_message(&self, message: TransportMessage) -> Option<TransportMessage> {
        if message.kind != MessageKind::Request {
            return None;
        }

        let response = self.handle(message.payload).await;
        let id = message.id.or_else(|| match &response.id {
            Value::String(id) => Some(id.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        });

        match id {
            Some(id) => Some(TransportMessage::response(id, &response)),
            None => {
                warn!("Dropping response to a request without any id");
                None
            }
        }
    }

    /// Answer one JSON-RPC payload
    pub async fn handle(&self, payload: Value) -> JsonRpcResponse {
        let id = payload.get("id").cloned().unwrap_or(Value::Null);

        let request: JsonRpcRequest = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(e) => {
                let err = Error::Parse(e.to_string());
                return JsonRpcResponse::failure(id, err.rpc_code(), err.to_string());
            }
        };

        debug!("Dispatching {}", request.method);
        match self.route(&request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                warn!("Request {} failed: {}", request.method, e);
                JsonRpcResponse::failure(id, e.rpc_code(), e.to_string())
            }
        }
    }

    async fn route(&self, request: &JsonRpcRequest) -> Result<Value> {
        if request.jsonrpc != JSONRPC_VERSION {
            return Err(Error::InvalidRequest(format!(
                "Unsupported jsonrpc version: {}",
                request.jsonrpc
            )));
        }

        match request.method.as_str() {
            METHOD_INITIALIZE => Ok(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": "cmdbridge",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
            METHOD_PING => Ok(json!({})),
            METHOD_TOOLS_LIST => Ok(json!({ "tools": tool_definitions() })),
            METHOD_TOOLS_CALL => self.call_tool(request.params.clone()).await,
            other => Err(Error::UnknownMethod(other.to_string())),
        }
    }

    async fn call_tool(&self, params: Value) -> Result<Value> {
        let call: ToolCallParams = serde_json::from_value(params)?;
        let arguments = match call.arguments {
            Value::Null => json!({}),
            other => other,
        };

        let result = match call.name.as_str() {
            TOOL_EXECUTE_COMMAND => {
                let params: ExecuteCommandParams = serde_json::from_value(arguments)?;
                self.executor
                    .execute_command(&params.command_id, params.args.unwrap_or_default())
                    .await
            }
            TOOL_LIST_COMMANDS => {
                let params: ListCommandsParams = serde_json::from_value(arguments)?;
                self.executor.list_commands(params.filter.as_deref()).await
            }
            other => return Err(Error::UnknownTool(other.to_string())),
        };

        Ok(serde_json::to_value(result)?)
    }
}
