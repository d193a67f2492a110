//! API layer: channel acceptors, HTTP surface and MCP endpoints

pub mod channel;
pub mod http;
pub mod mcp;
pub mod tcp;
