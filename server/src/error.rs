//! Error types for the cmdbridge hub

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cmdbridge_common::protocol::{INTERNAL_ERROR, INVALID_REQUEST, PARSE_ERROR};
use cmdbridge_common::{CorrelationError, TransportError};
use serde::Serialize;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the hub
#[derive(Debug, Error)]
pub enum Error {
    // Connection errors (2000-2999)
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("No command host is connected; ensure the host extension is running")]
    HostNotConnected,

    #[error("Handshake failed: {0}")]
    Handshake(String),

    // Command errors (3000-3999)
    #[error("Command '{0}' not found")]
    CommandNotFound(String),

    #[error("Command host error: {0}")]
    Host(String),

    // Protocol errors (4000-4999)
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    // Channel errors (5000-5999)
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    // General errors (1000-1999)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the error code
    pub fn code(&self) -> u32 {
        match self {
            // Connection errors (2000-2999)
            Error::SessionNotFound(_) => 2001,
            Error::HostNotConnected => 2002,
            Error::Handshake(_) => 2003,

            // Command errors (3000-3999)
            Error::CommandNotFound(_) => 3001,
            Error::Host(_) => 3002,

            // Protocol errors (4000-4999)
            Error::Parse(_) => 4001,
            Error::UnknownMethod(_) => 4002,
            Error::UnknownTool(_) => 4003,
            Error::InvalidParams(_) => 4004,

            // Channel errors (5000-5999)
            Error::Transport(_) => 5001,
            Error::Correlation(CorrelationError::Timeout { .. }) => 5002,
            Error::Correlation(_) => 5003,

            // General errors (1000-1999)
            Error::InvalidRequest(_) => 1001,
            Error::Internal(_) => 1003,
        }
    }

    /// JSON-RPC error code used when this error answers a request
    pub fn rpc_code(&self) -> i64 {
        match self {
            Error::Parse(_) => PARSE_ERROR,
            Error::InvalidRequest(_) => INVALID_REQUEST,
            _ => INTERNAL_ERROR,
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::SessionNotFound(_) | Error::CommandNotFound(_) => StatusCode::NOT_FOUND,

            Error::Parse(_)
            | Error::UnknownMethod(_)
            | Error::UnknownTool(_)
            | Error::InvalidParams(_)
            | Error::InvalidRequest(_)
            | Error::Handshake(_) => StatusCode::BAD_REQUEST,

            Error::Correlation(CorrelationError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,

            Error::HostNotConnected | Error::Transport(_) | Error::Correlation(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidParams(err.to_string())
    }
}
