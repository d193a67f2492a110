//! Bridge configuration

use std::str::FromStr;
use std::time::Duration;

use cmdbridge_common::session::SessionConfig;
use cmdbridge_common::ReconnectPolicy;

use crate::endpoint::Endpoint;

/// Bound on a single connect attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long the hub may take to acknowledge `connect`
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub endpoint: Endpoint,
    pub reconnect: ReconnectPolicy,
    pub session: SessionConfig,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl BridgeConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            reconnect: ReconnectPolicy::default(),
            session: SessionConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Defaults overridden by `CMDBRIDGE_*` environment variables
    pub fn from_env(endpoint: Endpoint) -> Self {
        let mut config = Self::new(endpoint);

        if let Some(attempts) = env_parse("CMDBRIDGE_MAX_RECONNECT_ATTEMPTS") {
            config.reconnect.max_attempts = attempts;
        }
        if let Some(ms) = env_parse("CMDBRIDGE_RECONNECT_BASE_DELAY_MS") {
            config.reconnect.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse("CMDBRIDGE_RECONNECT_MAX_DELAY_MS") {
            config.reconnect.max_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("CMDBRIDGE_REQUEST_TIMEOUT") {
            config.session.request_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = env_parse::<u64>("CMDBRIDGE_HEARTBEAT_INTERVAL") {
            config.session.heartbeat_interval = Duration::from_secs(secs.max(1));
        }

        config
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|val| val.trim().parse().ok())
}
