//! Wire data model
//!
//! Every frame on a channel is a [`TransportMessage`]: a small envelope with a
//! kind discriminator and a kind-specific payload. `request` and `response`
//! frames carry JSON-RPC 2.0 documents in their payload.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol revision reported by `initialize`
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_PING: &str = "ping";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Methods the hub sends to a connected host shim
pub const METHOD_HOST_GET_COMMANDS: &str = "host/getCommands";
pub const METHOD_HOST_EXECUTE_COMMAND: &str = "host/executeCommand";

pub const TOOL_EXECUTE_COMMAND: &str = "vscode.executeCommand";
pub const TOOL_LIST_COMMANDS: &str = "vscode.listCommands";

// JSON-RPC error codes
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const INTERNAL_ERROR: i64 = -32603;

/// Current time as epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Transport envelope
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Connect,
    Heartbeat,
    Request,
    Response,
    Error,
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: i64,
    #[serde(default)]
    pub payload: Value,
}

impl TransportMessage {
    pub fn new(kind: MessageKind, id: Option<String>, payload: Value) -> Self {
        Self {
            id,
            kind,
            timestamp: now_millis(),
            payload,
        }
    }

    pub fn connect(hello: &ConnectPayload) -> Self {
        Self::new(
            MessageKind::Connect,
            None,
            serde_json::to_value(hello).unwrap_or(Value::Null),
        )
    }

    pub fn connect_ack(ack: &ConnectAck) -> Self {
        Self::new(
            MessageKind::Connect,
            None,
            serde_json::to_value(ack).unwrap_or(Value::Null),
        )
    }

    pub fn heartbeat() -> Self {
        Self::new(MessageKind::Heartbeat, None, json!({ "ack": false }))
    }

    pub fn heartbeat_ack() -> Self {
        Self::new(MessageKind::Heartbeat, None, json!({ "ack": true }))
    }

    pub fn request(id: impl Into<String>, payload: Value) -> Self {
        Self::new(MessageKind::Request, Some(id.into()), payload)
    }

    pub fn response(id: impl Into<String>, response: &JsonRpcResponse) -> Self {
        Self::new(
            MessageKind::Response,
            Some(id.into()),
            serde_json::to_value(response).unwrap_or(Value::Null),
        )
    }

    pub fn error(id: Option<String>, code: i64, message: impl Into<String>) -> Self {
        Self::new(
            MessageKind::Error,
            id,
            json!({ "code": code, "message": message.into() }),
        )
    }

    pub fn disconnect(reason: impl Into<String>) -> Self {
        Self::new(
            MessageKind::Disconnect,
            None,
            json!({ "reason": reason.into() }),
        )
    }

    /// True for a heartbeat that answers another heartbeat
    pub fn is_heartbeat_ack(&self) -> bool {
        self.kind == MessageKind::Heartbeat
            && self.payload.get("ack").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Reason carried by a `disconnect` frame
    pub fn disconnect_reason(&self) -> Option<&str> {
        self.payload.get("reason").and_then(Value::as_str)
    }
}

// ============================================================================
// Handshake
// ============================================================================

/// Role of the peer that opened a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    /// Stdio bridge forwarding MCP tool calls
    Bridge,
    /// Editor-side shim that owns the command registry
    Host,
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientType::Bridge => write!(f, "bridge"),
            ClientType::Host => write!(f, "host"),
        }
    }
}

/// Payload of the `connect` frame a client sends first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectPayload {
    pub client_type: ClientType,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub version: String,
}

impl ConnectPayload {
    pub fn new(client_type: ClientType, capabilities: Vec<String>) -> Self {
        Self {
            client_type,
            capabilities,
            pid: std::process::id(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Payload of the `connect` frame the server answers with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectAck {
    pub session_id: String,
    pub version: String,
}

// ============================================================================
// JSON-RPC
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC response; exactly one of `result` and `error` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn into_outcome(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// Tool results
// ============================================================================

/// Uniform outcome of a tool operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandExecutionResult {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("Unknown error")
    }
}
