//! Error types for the bridge

use cmdbridge_common::{CorrelationError, ReconnectError, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Invalid endpoint '{0}': expected a port, host:port, tcp://host:port or ws://url")]
    InvalidEndpoint(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("{0}; ensure the host extension is running")]
    Reconnect(#[from] ReconnectError),

    #[error("Not connected to the cmdbridge hub")]
    NotConnected,

    #[error(transparent)]
    Call(#[from] CorrelationError),
}
