//! Server configuration

use std::str::FromStr;
use std::time::Duration;

use cmdbridge_common::session::SessionConfig;
use serde::Deserialize;

/// How the hub exposes MCP directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpMode {
    /// Only bridges and hosts talk to the hub
    #[default]
    Disabled,
    /// MCP over the process's own stdin/stdout
    Stdio,
    /// Streamable HTTP MCP nested under `mcp_path`
    Http,
}

impl FromStr for McpMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disabled" | "off" | "" => Ok(McpMode::Disabled),
            "stdio" => Ok(McpMode::Stdio),
            "http" | "sse" => Ok(McpMode::Http),
            other => Err(format!("Unknown MCP mode: {}", other)),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bind address for both listeners
    #[serde(default = "default_host")]
    pub host: String,

    /// Raw TCP channel port
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP port (health, sessions, WebSocket channels, MCP over HTTP)
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Live sessions kept before the oldest is evicted
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Seconds without inbound traffic before a session is swept
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// Seconds between registry sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,

    /// Seconds between heartbeats on every session
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,

    /// Seconds a correlated request may stay pending
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default)]
    pub mcp_mode: McpMode,

    /// Path the HTTP MCP service is nested under
    #[serde(default = "default_mcp_path")]
    pub mcp_path: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    cmdbridge_common::DEFAULT_PORT
}

fn default_http_port() -> u16 {
    19848
}

fn default_max_connections() -> usize {
    10
}

fn default_idle_timeout() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_heartbeat_interval() -> u64 {
    15
}

fn default_request_timeout() -> u64 {
    10
}

fn default_mcp_path() -> String {
    "/mcp".to_string()
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|val| val.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Config::default();

        if let Ok(val) = std::env::var("CMDBRIDGE_HOST") {
            config.host = val;
        }
        if let Some(port) = env_parse("CMDBRIDGE_PORT") {
            config.port = port;
        }
        if let Some(port) = env_parse("CMDBRIDGE_HTTP_PORT") {
            config.http_port = port;
        }
        if let Some(max) = env_parse("CMDBRIDGE_MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        if let Some(secs) = env_parse("CMDBRIDGE_IDLE_TIMEOUT") {
            config.idle_timeout = secs;
        }
        if let Some(secs) = env_parse("CMDBRIDGE_SWEEP_INTERVAL") {
            config.sweep_interval = secs;
        }
        if let Some(secs) = env_parse("CMDBRIDGE_HEARTBEAT_INTERVAL") {
            config.heartbeat_interval = secs;
        }
        if let Some(secs) = env_parse("CMDBRIDGE_REQUEST_TIMEOUT") {
            config.request_timeout = secs;
        }
        if let Ok(val) = std::env::var("CMDBRIDGE_MCP_MODE") {
            config.mcp_mode = val.parse().map_err(anyhow::Error::msg)?;
        }
        if let Ok(val) = std::env::var("CMDBRIDGE_MCP_PATH") {
            config.mcp_path = val;
        }

        if config.max_connections == 0 {
            anyhow::bail!("CMDBRIDGE_MAX_CONNECTIONS must be at least 1");
        }

        Ok(config)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }

    /// Tuning applied to every accepted session
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval.max(1)),
            request_timeout: Duration::from_secs(self.request_timeout.max(1)),
            ..Default::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            http_port: default_http_port(),
            max_connections: default_max_connections(),
            idle_timeout: default_idle_timeout(),
            sweep_interval: default_sweep_interval(),
            heartbeat_interval: default_heartbeat_interval(),
            request_timeout: default_request_timeout(),
            mcp_mode: McpMode::default(),
            mcp_path: default_mcp_path(),
        }
    }
}
