//! Editor command host boundary
//!
//! The command registry and execution engine live inside the editor. The hub
//! only sees them through [`CommandHost`]; [`RemoteCommandHost`] reaches them
//! through the host shim session registered with the connection registry.

use std::sync::Arc;

use async_trait::async_trait;
use cmdbridge_common::protocol::{METHOD_HOST_EXECUTE_COMMAND, METHOD_HOST_GET_COMMANDS};
use serde_json::{json, Value};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use super::registry::ConnectionRegistry;
use crate::error::{Error, Result};

/// The editor's command registry and execution engine
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandHost: Send + Sync {
    /// Every registered command id
    async fn get_commands(&self, include_internal: bool) -> Result<Vec<String>>;

    /// Run a command and return whatever it produced
    async fn execute_command(&self, command_id: &str, args: Vec<Value>) -> Result<Value>;
}

/// Forwards host calls to the most recent host shim session
pub struct RemoteCommandHost {
    registry: Arc<ConnectionRegistry>,
}

impl RemoteCommandHost {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl CommandHost for RemoteCommandHost {
    async fn get_commands(&self, include_internal: bool) -> Result<Vec<String>> {
        let session = self.registry.host_session().ok_or(Error::HostNotConnected)?;
        debug!("Fetching commands from host session {}", session.id());

        let result = session
            .call(
                METHOD_HOST_GET_COMMANDS,
                json!({ "includeInternal": include_internal }),
            )
            .await?;

        // Shims answer with either a bare array or `{ commands: [...] }`
        let commands = match result {
            Value::Object(mut map) => map.remove("commands").unwrap_or(Value::Null),
            other => other,
        };
        serde_json::from_value(commands)
            .map_err(|e| Error::Host(format!("Malformed command list: {}", e)))
    }

    async fn execute_command(&self, command_id: &str, args: Vec<Value>) -> Result<Value> {
        let session = self.registry.host_session().ok_or(Error::HostNotConnected)?;
        debug!(
            "Executing {} on host session {}",
            command_id,
            session.id()
        );

        let result = session
            .call(
                METHOD_HOST_EXECUTE_COMMAND,
                json!({ "commandId": command_id, "args": args }),
            )
            .await?;
        Ok(result)
    }
}
