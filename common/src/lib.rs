//! Shared core for cmdbridge.
//!
//! This crate provides:
//! - [`protocol`]: the newline-delimited transport envelope and the JSON-RPC payloads it carries
//! - [`codec`]: line framing for [`TransportMessage`]s
//! - [`correlator`]: request id allocation and response matching
//! - [`session`]: one live channel with heartbeat and health tracking
//! - [`transport`]: duplex byte-stream adapters (TCP, WebSocket, in-memory)
//! - [`reconnect`]: capped exponential backoff for the client side
//! - [`tools`]: the MCP tool surface exposed to AI clients

pub mod codec;
pub mod correlator;
pub mod error;
pub mod protocol;
pub mod reconnect;
pub mod session;
pub mod tools;
pub mod transport;

pub use codec::LineDecoder;
pub use correlator::Correlator;
pub use error::{CorrelationError, ReconnectError, TransportError};
pub use protocol::{
    ClientType, CommandExecutionResult, ConnectAck, ConnectPayload, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, MessageKind, TransportMessage,
};
pub use reconnect::{ReconnectPolicy, Reconnector};
pub use session::{ChannelSession, MessageCounts, SessionConfig, SessionHealth, SessionState};
pub use tools::{CommandToolsHandler, ToolBackend};
pub use transport::Transport;

/// Default TCP port the hub listens on for bridge connections
pub const DEFAULT_PORT: u16 = 19847;
