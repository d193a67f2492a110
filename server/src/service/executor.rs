//! Tool executor
//!
//! Runs the two tool operations against a [`CommandHost`]. Every outcome,
//! including host failures and panics, comes back as a
//! [`CommandExecutionResult`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use cmdbridge_common::protocol::CommandExecutionResult;
use cmdbridge_common::ToolBackend;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::sanitize::sanitize;
use crate::error::{Error, Result};
use crate::infra::host::CommandHost;

pub struct ToolExecutor {
    host: Arc<dyn CommandHost>,
}

impl ToolExecutor {
    pub fn new(host: Arc<dyn CommandHost>) -> Self {
        Self { host }
    }

    /// Check availability, run the command and sanitize its result
    pub async fn execute_command(
        &self,
        command_id: &str,
        args: Vec<Value>,
    ) -> CommandExecutionResult {
        info!("Executing command: {} ({} args)", command_id, args.len());

        let outcome = AssertUnwindSafe(self.try_execute(command_id, args))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(value)) => CommandExecutionResult::ok(value),
            Ok(Err(e)) => {
                warn!("Command {} failed: {}", command_id, e);
                CommandExecutionResult::err(e.to_string())
            }
            Err(_) => {
                error!("Command host panicked while executing {}", command_id);
                CommandExecutionResult::err(format!(
                    "Command host panicked while executing '{}'",
                    command_id
                ))
            }
        }
    }

    async fn try_execute(&self, command_id: &str, args: Vec<Value>) -> Result<Value> {
        let available = self.host.get_commands(true).await?;
        if !available.iter().any(|id| id == command_id) {
            return Err(Error::CommandNotFound(command_id.to_string()));
        }

        let raw = self.host.execute_command(command_id, args).await?;
        Ok(sanitize(&raw))
    }

    /// Sorted command ids, optionally narrowed by a case-insensitive substring
    pub async fn list_commands(&self, filter: Option<&str>) -> CommandExecutionResult {
        let outcome = AssertUnwindSafe(async { self.host.get_commands(true).await })
            .catch_unwind()
            .await;

        let commands = match outcome {
            Ok(Ok(commands)) => commands,
            Ok(Err(e)) => {
                warn!("Listing commands failed: {}", e);
                return CommandExecutionResult::err(e.to_string());
            }
            Err(_) => {
                error!("Command host panicked while listing commands");
                return CommandExecutionResult::err("Command host panicked while listing commands");
            }
        };

        let filtered = filter_commands(commands, filter);
        debug!("Listing {} commands (filter: {:?})", filtered.len(), filter);
        CommandExecutionResult::ok(Value::from(filtered))
    }
}

/// Case-insensitive substring match, ascending order, duplicates removed
pub fn filter_commands(commands: Vec<String>, filter: Option<&str>) -> Vec<String> {
    let needle = filter
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty());

    let mut matching: Vec<String> = match needle {
        Some(needle) => commands
            .into_iter()
            .filter(|id| id.to_lowercase().contains(&needle))
            .collect(),
        None => commands,
    };
    matching.sort();
    matching.dedup();
    matching
}

#[async_trait]
impl ToolBackend for ToolExecutor {
    async fn execute_command(&self, command_id: &str, args: Vec<Value>) -> CommandExecutionResult {
        ToolExecutor::execute_command(self, command_id, args).await
    }

    async fn list_commands(&self, filter: Option<String>) -> CommandExecutionResult {
        ToolExecutor::list_commands(self, filter.as_deref()).await
    }
}
