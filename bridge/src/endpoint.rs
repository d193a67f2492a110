//! Hub endpoint selection
//!
//! The bridge takes at most one positional argument naming the hub: a bare
//! port, `host:port`, `tcp://host:port`, or a `ws://` / `wss://` URL.

use std::fmt;
use std::str::FromStr;

use cmdbridge_common::{Transport, TransportError, DEFAULT_PORT};

use crate::error::BridgeError;

const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    WebSocket(String),
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Tcp {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Endpoint {
    /// Endpoint from the first CLI argument, or the default when absent
    pub fn from_arg(arg: Option<&str>) -> Result<Self, BridgeError> {
        match arg {
            Some(arg) => arg.parse(),
            None => Ok(Self::default()),
        }
    }

    pub async fn connect(&self) -> Result<Transport, TransportError> {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => {
                Transport::connect_tcp(&format!("[{}]:{}", host, port)).await
            }
            Endpoint::Tcp { host, port } => {
                Transport::connect_tcp(&format!("{}:{}", host, port)).await
            }
            Endpoint::WebSocket(url) => Transport::connect_websocket(url).await,
        }
    }
}

fn parse_port(raw: &str, input: &str) -> Result<u16, BridgeError> {
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(BridgeError::InvalidEndpoint(input.to_string())),
    }
}

fn parse_host_port(rest: &str, input: &str) -> Result<Endpoint, BridgeError> {
    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| BridgeError::InvalidEndpoint(input.to_string()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok(Endpoint::Tcp {
        host: if host.is_empty() {
            DEFAULT_HOST.to_string()
        } else {
            host.to_string()
        },
        port: parse_port(port, input)?,
    })
}

impl FromStr for Endpoint {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Ok(Self::default());
        }

        if input.starts_with("ws://") || input.starts_with("wss://") {
            return Ok(Endpoint::WebSocket(input.to_string()));
        }
        if let Some(rest) = input.strip_prefix("tcp://") {
            return parse_host_port(rest.trim_end_matches('/'), input);
        }
        if input.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Endpoint::Tcp {
                host: DEFAULT_HOST.to_string(),
                port: parse_port(input, input)?,
            });
        }
        if input.contains("://") {
            return Err(BridgeError::InvalidEndpoint(input.to_string()));
        }
        parse_host_port(input, input)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            Endpoint::WebSocket(url) => write!(f, "{}", url),
        }
    }
}
