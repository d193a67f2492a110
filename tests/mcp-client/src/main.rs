//! MCP Client Test
//!
//! Spawns the stdio bridge, connects to it as an MCP client and exercises
//! both command tools against a running hub with a host attached.

use anyhow::Result;
use rmcp::{
    ServiceExt,
    model::CallToolRequestParam,
    transport::{TokioChildProcess, ConfigureCommandExt},
};
use serde_json::json;
use tokio::process::Command;
use tracing::{info, error, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Helper to call a tool and print the result
async fn call_tool(
    client: &rmcp::service::RunningService<rmcp::service::RoleClient, ()>,
    name: &str,
    args: serde_json::Value,
) -> Result<(String, bool)> {
    info!("📤 Calling tool: {}", name);
    info!("   Arguments: {}", serde_json::to_string_pretty(&args)?);

    let result = client
        .call_tool(CallToolRequestParam {
            name: name.to_string().into(),
            arguments: args.as_object().cloned(),
        })
        .await?;

    let content = result
        .content
        .first()
        .and_then(|c| c.raw.as_text())
        .map(|t| t.text.clone())
        .unwrap_or_else(|| "No content".into());

    let is_error = result.is_error.unwrap_or(false);
    if is_error {
        error!("❌ Tool error: {}", content);
    } else {
        info!("✅ Result:\n{}", content);
    }

    Ok((content, is_error))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    info!("🚀 Starting MCP Client Test");
    info!("================================");

    let bridge_path = std::env::var("MCP_BRIDGE_PATH")
        .unwrap_or_else(|_| "../../../target/debug/cmdbridge".to_string());
    let endpoint = std::env::var("CMDBRIDGE_TEST_ENDPOINT")
        .unwrap_or_else(|_| "127.0.0.1:19847".to_string());

    info!("📡 Spawning bridge {} for hub {}", bridge_path, endpoint);

    let transport = TokioChildProcess::new(
        Command::new(&bridge_path).configure(|cmd| {
            cmd.arg(&endpoint);
            cmd.env("RUST_LOG", "info");
        })
    )?;

    let client = ().serve(transport).await?;

    info!("✅ Connected to bridge");
    info!("");

    // ========================================================================
    // Test 1: List available tools
    // ========================================================================
    info!("📋 Test 1: List available tools");
    info!("--------------------------------");

    let tools = client.list_tools(None).await?;
    info!("Available tools ({}):", tools.tools.len());
    for tool in &tools.tools {
        info!("  - {} : {}", tool.name, tool.description.as_deref().unwrap_or(""));
    }
    let names: Vec<_> = tools.tools.iter().map(|t| t.name.to_string()).collect();
    anyhow::ensure!(
        names.contains(&"vscode.executeCommand".to_string())
            && names.contains(&"vscode.listCommands".to_string()),
        "bridge does not expose both command tools: {:?}",
        names
    );
    info!("");

    // Give the bridge a moment to finish its channel handshake
    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;

    // ========================================================================
    // Test 2: List commands
    // ========================================================================
    info!("🔎 Test 2: List commands");
    info!("--------------------------------");

    info!("\n🔎 2.1 All commands...");
    let (listing, is_error) = call_tool(&client, "vscode.listCommands", json!({})).await?;
    anyhow::ensure!(!is_error, "listing failed: {}", listing);
    info!("");

    info!("🔎 2.2 Commands matching 'editor'...");
    call_tool(&client, "vscode.listCommands", json!({ "filter": "editor" })).await?;
    info!("");

    // ========================================================================
    // Test 3: Execute commands
    // ========================================================================
    info!("⚙️  Test 3: Execute commands");
    info!("--------------------------------");

    info!("\n🔧 3.1 Running 'workbench.action.files.saveAll'...");
    call_tool(
        &client,
        "vscode.executeCommand",
        json!({ "commandId": "workbench.action.files.saveAll" }),
    )
    .await?;
    info!("");

    info!("🔧 3.2 Running an unknown command...");
    let (message, is_error) = call_tool(
        &client,
        "vscode.executeCommand",
        json!({ "commandId": "mcp.test.doesNotExist", "args": [] }),
    )
    .await?;
    anyhow::ensure!(is_error, "unknown command should fail");
    anyhow::ensure!(
        message.contains("not found"),
        "unexpected error text: {}",
        message
    );
    info!("");

    // ========================================================================
    // Done
    // ========================================================================
    info!("");
    info!("================================");
    info!("✅ All MCP tests completed successfully!");
    info!("================================");

    // Disconnect
    client.cancel().await?;

    Ok(())
}
