//! cmdbridge stdio bridge
//!
//! Spawned by an AI client as `cmdbridge [endpoint]`. Serves MCP on its own
//! stdio and forwards every tool call to the hub over a channel session,
//! reconnecting with capped exponential backoff when the channel is lost.

pub mod config;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod tools;

pub use config::BridgeConfig;
pub use connection::ConnectionManager;
pub use endpoint::Endpoint;
pub use error::BridgeError;
pub use tools::ChannelToolBackend;
