//! Integration tests for the cmdbridge hub
//!
//! Every test runs its own hub on ephemeral ports, so nothing needs to be
//! started beforehand. Run with: cargo test -p integration-tests

use std::sync::Arc;
use std::time::Duration;

use cmdbridge::{BridgeConfig, ChannelToolBackend, ConnectionManager, Endpoint};
use cmdbridge_common::protocol::{MessageKind, TransportMessage};
use cmdbridge_common::{CommandExecutionResult, CorrelationError, ToolBackend};
use cmdbridge_server::Config;
use futures_util::{SinkExt, StreamExt};
use integration_tests::*;
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;

async fn next_event(channel: &mut BridgeChannel, kind: MessageKind) -> TransportMessage {
    timeout(Duration::from_secs(5), async {
        loop {
            let message = channel.events.recv().await.expect("channel closed");
            if message.kind == kind {
                return message;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {:?} frame arrived", kind))
}

// ============================================================================
// Health Tests
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let hub = TestHub::start().await;

    let health = hub.health().await;
    assert_eq!(health.status, "healthy");
    assert!(!health.host_connected);
    assert_eq!(health.stats.total, 0);
    assert_eq!(health.stats.error_rate, 0.0);

    hub.stop().await;
}

#[tokio::test]
async fn test_health_reports_connected_host() {
    let hub = TestHub::start().await;
    let host = FakeHost::connect(&hub).await;
    hub.wait_for_sessions(1).await;

    let health = hub.health().await;
    assert!(health.host_connected);
    assert_eq!(health.stats.total, 1);
    assert_eq!(health.stats.active, 1);

    host.disconnect().await;
    hub.wait_for_sessions(0).await;
    assert!(!hub.health().await.host_connected);

    hub.stop().await;
}

// ============================================================================
// Session Tests
// ============================================================================

#[tokio::test]
async fn test_sessions_listing() {
    let hub = TestHub::start().await;
    let host = FakeHost::connect(&hub).await;
    let bridge = BridgeChannel::tcp(&hub).await;
    hub.wait_for_sessions(2).await;

    let response = hub
        .client
        .get(hub.api_url("/sessions"))
        .send()
        .await
        .expect("Failed to list sessions");
    assert!(response.status().is_success());

    let sessions: Vec<SessionResponse> = response.json().await.unwrap();
    assert_eq!(sessions.len(), 2);
    // Oldest first
    assert_eq!(sessions[0].id, host.session_id);
    assert_eq!(sessions[0].client_type, "host");
    assert_eq!(sessions[1].id, bridge.session_id);
    assert_eq!(sessions[1].client_type, "bridge");
    assert_eq!(sessions[1].pid, std::process::id());
    assert!(sessions.iter().all(|s| s.status == "active"));

    let single: SessionResponse = hub
        .client
        .get(hub.api_url(&format!("/sessions/{}", bridge.session_id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(single.id, bridge.session_id);
    assert!(single.remote_address.starts_with("127.0.0.1:"));

    hub.stop().await;
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let hub = TestHub::start().await;

    let response = hub
        .client
        .get(hub.api_url("/sessions/nonexistent-session"))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status().as_u16(), 404);

    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.code, 2001);
    assert!(error.message.contains("nonexistent-session"));

    hub.stop().await;
}

#[tokio::test]
async fn test_oldest_session_is_evicted_at_limit() {
    let hub = TestHub::start_with(Config {
        max_connections: 2,
        ..Config::default()
    })
    .await;

    let mut first = BridgeChannel::tcp(&hub).await;
    hub.wait_for_sessions(1).await;
    let second = BridgeChannel::tcp(&hub).await;
    hub.wait_for_sessions(2).await;
    let third = BridgeChannel::tcp(&hub).await;

    let goodbye = next_event(&mut first, MessageKind::Disconnect).await;
    assert_eq!(
        goodbye.disconnect_reason(),
        Some("Evicted: connection limit reached")
    );

    hub.wait_for_sessions(2).await;
    assert!(!hub.state.registry.contains(&first.session_id));
    assert!(hub.state.registry.contains(&second.session_id));
    assert!(hub.state.registry.contains(&third.session_id));

    hub.stop().await;
}

// ============================================================================
// Tool Tests over TCP
// ============================================================================

#[tokio::test]
async fn test_initialize_and_tools_list() {
    let hub = TestHub::start().await;
    let bridge = BridgeChannel::tcp(&hub).await;

    let info = bridge.call("initialize", json!({})).await.unwrap();
    assert_eq!(info["protocolVersion"], "2024-11-05");
    assert_eq!(info["serverInfo"]["name"], "cmdbridge");

    let tools = bridge.call("tools/list", json!({})).await.unwrap();
    let mut names: Vec<_> = tools["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, ["vscode.executeCommand", "vscode.listCommands"]);

    assert_eq!(bridge.call("ping", Value::Null).await.unwrap(), json!({}));

    hub.stop().await;
}

#[tokio::test]
async fn test_list_commands_through_host() {
    let hub = TestHub::start().await;
    let _host = FakeHost::connect(&hub).await;
    let bridge = BridgeChannel::tcp(&hub).await;

    let all = bridge
        .call_tool("vscode.listCommands", json!({}))
        .await
        .unwrap();
    assert_eq!(all["success"], true);
    assert_eq!(all["result"], json!(HOST_COMMANDS));

    let filtered = bridge
        .call_tool("vscode.listCommands", json!({ "filter": "  GIT " }))
        .await
        .unwrap();
    assert_eq!(filtered["result"], json!(["git.commit"]));

    hub.stop().await;
}

#[tokio::test]
async fn test_execute_command_through_host() {
    let hub = TestHub::start().await;
    let _host = FakeHost::connect(&hub).await;
    let bridge = BridgeChannel::tcp(&hub).await;

    let echoed = bridge
        .call_tool(
            "vscode.executeCommand",
            json!({ "commandId": "test.echo", "args": ["hello"] }),
        )
        .await
        .unwrap();
    assert_eq!(echoed, json!({ "success": true, "result": "hello" }));

    let saved = bridge
        .call_tool(
            "vscode.executeCommand",
            json!({ "commandId": "workbench.action.files.save" }),
        )
        .await
        .unwrap();
    assert_eq!(saved, json!({ "success": true, "result": null }));

    hub.stop().await;
}

#[tokio::test]
async fn test_editor_shapes_are_sanitized() {
    let hub = TestHub::start().await;
    let _host = FakeHost::connect(&hub).await;
    let bridge = BridgeChannel::tcp(&hub).await;

    let result = bridge
        .call_tool("vscode.executeCommand", json!({ "commandId": "test.uri" }))
        .await
        .unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(
        result["result"]["uri"],
        json!({ "_type": "Uri", "value": "file:///work/src/main.rs" })
    );
    assert_eq!(result["result"]["range"]["_type"], "Range");
    assert_eq!(
        result["result"]["range"]["end"],
        json!({ "_type": "Position", "line": 3, "character": 12 })
    );

    hub.stop().await;
}

#[tokio::test]
async fn test_unknown_command_is_reported() {
    let hub = TestHub::start().await;
    let _host = FakeHost::connect(&hub).await;
    let bridge = BridgeChannel::tcp(&hub).await;

    let result = bridge
        .call_tool(
            "vscode.executeCommand",
            json!({ "commandId": "does.not.exist" }),
        )
        .await
        .unwrap();
    assert_eq!(
        result,
        json!({ "success": false, "error": "Command 'does.not.exist' not found" })
    );

    hub.stop().await;
}

#[tokio::test]
async fn test_host_failure_is_reported() {
    let hub = TestHub::start().await;
    let _host = FakeHost::connect(&hub).await;
    let bridge = BridgeChannel::tcp(&hub).await;

    let result = bridge
        .call_tool("vscode.executeCommand", json!({ "commandId": "git.commit" }))
        .await
        .unwrap();
    assert_eq!(result["success"], false);
    assert!(result["error"]
        .as_str()
        .unwrap()
        .contains("Nothing to commit"));

    hub.stop().await;
}

#[tokio::test]
async fn test_tools_without_host() {
    let hub = TestHub::start().await;
    let bridge = BridgeChannel::tcp(&hub).await;

    let result = bridge
        .call_tool("vscode.listCommands", json!({}))
        .await
        .unwrap();
    assert_eq!(result["success"], false);
    assert!(result["error"]
        .as_str()
        .unwrap()
        .contains("ensure the host extension is running"));

    hub.stop().await;
}

#[tokio::test]
async fn test_unknown_method_and_tool() {
    let hub = TestHub::start().await;
    let bridge = BridgeChannel::tcp(&hub).await;

    let err = bridge
        .session
        .call("resources/list", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CorrelationError::Remote { code: -32603, .. }));

    let err = bridge
        .session
        .call("tools/call", json!({ "name": "vscode.openFile" }))
        .await
        .unwrap_err();
    match err {
        CorrelationError::Remote { code, message } => {
            assert_eq!(code, -32603);
            assert!(message.contains("vscode.openFile"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    hub.stop().await;
}

// ============================================================================
// WebSocket Tests
// ============================================================================

#[tokio::test]
async fn test_websocket_channel() {
    let hub = TestHub::start().await;
    let _host = FakeHost::connect(&hub).await;
    let bridge = BridgeChannel::websocket(&hub).await;
    hub.wait_for_sessions(2).await;

    let sessions = hub.state.registry.sessions();
    let ws_session = sessions
        .iter()
        .find(|s| s.id == bridge.session_id)
        .expect("websocket session registered");
    assert!(ws_session.remote_address.starts_with("ws://"));

    let result = bridge
        .call_tool(
            "vscode.executeCommand",
            json!({ "commandId": "test.echo", "args": [42] }),
        )
        .await
        .unwrap();
    assert_eq!(result, json!({ "success": true, "result": 42 }));

    hub.stop().await;
}

#[tokio::test]
async fn test_websocket_raw_frames() {
    let hub = TestHub::start().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(hub.ws_url())
        .await
        .expect("Failed to connect websocket");

    let hello = json!({
        "type": "connect",
        "timestamp": 0,
        "payload": { "clientType": "bridge", "capabilities": ["tools"] }
    });
    ws.send(Message::text(format!("{}\n", hello))).await.unwrap();

    let ack = timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let frame: Value = serde_json::from_str(text.as_str().trim()).unwrap();
                    if frame["type"] == "connect" {
                        return frame;
                    }
                }
                Some(Ok(_)) => continue,
                other => panic!("websocket ended: {:?}", other),
            }
        }
    })
    .await
    .expect("no connect ack");
    assert!(ack["payload"]["sessionId"].as_str().is_some());

    let ping = json!({
        "id": "raw-1",
        "type": "request",
        "timestamp": 0,
        "payload": { "jsonrpc": "2.0", "id": 7, "method": "ping" }
    });
    ws.send(Message::text(format!("{}\n", ping))).await.unwrap();

    let response = timeout(Duration::from_secs(5), async {
        loop {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let frame: Value = serde_json::from_str(text.as_str().trim()).unwrap();
                if frame["type"] == "response" {
                    return frame;
                }
            }
        }
    })
    .await
    .expect("no response");
    assert_eq!(response["id"], "raw-1");
    assert_eq!(response["payload"]["id"], 7);
    assert_eq!(response["payload"]["result"], json!({}));

    hub.stop().await;
}

// ============================================================================
// Bridge Tests
// ============================================================================

fn bridge_config(hub: &TestHub) -> BridgeConfig {
    let mut config = BridgeConfig::new(Endpoint::Tcp {
        host: "127.0.0.1".to_string(),
        port: hub.tcp_addr.port(),
    });
    config.reconnect.max_attempts = 20;
    config.reconnect.base_delay = Duration::from_millis(20);
    config.reconnect.max_delay = Duration::from_millis(100);
    config
}

async fn wait_connected(manager: &ConnectionManager) {
    timeout(Duration::from_secs(5), async {
        while !manager.is_connected().await {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("bridge never connected");
}

#[tokio::test]
async fn test_bridge_forwards_to_host() {
    let hub = TestHub::start().await;
    let _host = FakeHost::connect(&hub).await;

    let manager = ConnectionManager::new(bridge_config(&hub));
    let runner = tokio::spawn(manager.clone().run());
    wait_connected(&manager).await;

    let backend = ChannelToolBackend::new(manager.clone());
    let result = backend
        .execute_command("test.echo", vec![json!({ "nested": [1, 2] })])
        .await;
    assert_eq!(result, CommandExecutionResult::ok(json!({ "nested": [1, 2] })));

    let listing = backend.list_commands(Some("format".to_string())).await;
    assert_eq!(
        listing,
        CommandExecutionResult::ok(json!(["editor.action.formatDocument"]))
    );

    manager.shutdown().await;
    assert!(runner.await.unwrap().is_ok());
    hub.stop().await;
}

#[tokio::test]
async fn test_bridge_reconnects_after_hub_restart() {
    let hub = TestHub::start().await;
    let port = hub.tcp_addr.port();

    let manager = ConnectionManager::new(bridge_config(&hub));
    let runner = tokio::spawn(manager.clone().run());
    wait_connected(&manager).await;
    let first = manager.session().await.unwrap().id().to_string();

    hub.stop().await;
    timeout(Duration::from_secs(5), async {
        while manager.is_connected().await {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("bridge did not notice the hub going away");

    // Bring a hub back on the same port
    let tcp = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
    let http = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let state = cmdbridge_server::AppState::new(Arc::new(Config::default()));
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let restarted = tokio::spawn(cmdbridge_server::run(state, tcp, http, async move {
        let _ = stopped.await;
    }));

    wait_connected(&manager).await;
    let second = manager.session().await.unwrap().id().to_string();
    assert_ne!(first, second);
    assert_eq!(manager.attempts(), 0);

    manager.shutdown().await;
    assert!(runner.await.unwrap().is_ok());
    let _ = stop.send(());
    restarted.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_hub_shutdown_notifies_channels() {
    let hub = TestHub::start().await;
    let mut bridge = BridgeChannel::tcp(&hub).await;
    hub.wait_for_sessions(1).await;

    let stopping = tokio::spawn(hub.stop());
    let goodbye = next_event(&mut bridge, MessageKind::Disconnect).await;
    assert_eq!(goodbye.disconnect_reason(), Some("Server shutting down"));
    stopping.await.unwrap();
}
