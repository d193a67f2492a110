//! Error types shared by the hub and the bridge

use std::time::Duration;

use thiserror::Error;

/// Errors raised by a physical channel
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Connection closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::WebSocket(err.to_string())
    }
}

/// Why a correlated request did not produce a result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    #[error("Request '{method}' timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("{0}")]
    Aborted(String),

    #[error("Remote error {code}: {message}")]
    Remote { code: i64, message: String },
}

/// Reconnection gave up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconnectError {
    #[error("Maximum reconnect attempts exceeded ({attempts})")]
    MaxAttemptsExceeded { attempts: u32 },
}
