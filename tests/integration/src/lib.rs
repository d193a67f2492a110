//! Integration test helpers for the cmdbridge hub
//!
//! Each test starts its own hub in-process on ephemeral ports, attaches a
//! fake host shim that owns a small command registry, and talks to the hub
//! the way the bridge does.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cmdbridge_common::protocol::{
    ClientType, ConnectAck, ConnectPayload, JsonRpcRequest, JsonRpcResponse, MessageKind,
    TransportMessage, INTERNAL_ERROR, METHOD_HOST_EXECUTE_COMMAND, METHOD_HOST_GET_COMMANDS,
};
use cmdbridge_common::{ChannelSession, SessionConfig, Transport};
use cmdbridge_server::{AppState, Config};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing_subscriber::EnvFilter;

/// Commands registered by [`FakeHost`]
pub const HOST_COMMANDS: [&str; 5] = [
    "editor.action.formatDocument",
    "git.commit",
    "test.echo",
    "test.uri",
    "workbench.action.files.save",
];

/// Route hub logs through the test harness; `RUST_LOG=debug` to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A hub running in-process on ephemeral ports
pub struct TestHub {
    pub tcp_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub state: AppState,
    pub client: reqwest::Client,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl TestHub {
    pub async fn start() -> Self {
        Self::start_with(Config::default()).await
    }

    pub async fn start_with(config: Config) -> Self {
        init_tracing();

        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let http = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let tcp_addr = tcp.local_addr().unwrap();
        let http_addr = http.local_addr().unwrap();

        let state = AppState::new(Arc::new(config));
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(cmdbridge_server::run(state.clone(), tcp, http, async move {
            let _ = stopped.await;
        }));

        Self {
            tcp_addr,
            http_addr,
            state,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap(),
            stop: Some(stop),
            task,
        }
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("http://{}/api/v1{}", self.http_addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.http_addr)
    }

    pub async fn health(&self) -> HealthResponse {
        self.client
            .get(self.api_url("/health"))
            .send()
            .await
            .expect("Failed to send health request")
            .json()
            .await
            .expect("Failed to parse health response")
    }

    /// Wait until the registry holds `count` sessions
    pub async fn wait_for_sessions(&self, count: usize) {
        timeout(Duration::from_secs(5), async {
            while self.state.registry.len() != count {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "expected {} sessions, registry holds {}",
                count,
                self.state.registry.len()
            )
        });
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        timeout(Duration::from_secs(5), &mut self.task)
            .await
            .expect("hub did not stop")
            .expect("hub task panicked")
            .expect("hub returned an error");
    }
}

/// Open a channel on `transport` and complete the handshake as `client_type`
pub async fn handshake(
    transport: Transport,
    client_type: ClientType,
) -> (Arc<ChannelSession>, mpsc::Receiver<TransportMessage>, ConnectAck) {
    let config = SessionConfig {
        heartbeat_interval: Duration::from_secs(3600),
        ..Default::default()
    };
    let (session, mut events) = ChannelSession::open(transport, config);
    let hello = ConnectPayload::new(client_type, vec!["tools".to_string()]);
    session.send(TransportMessage::connect(&hello)).await;

    let ack = timeout(Duration::from_secs(5), async {
        loop {
            let message = events.recv().await.expect("channel closed during handshake");
            if message.kind == MessageKind::Connect {
                return serde_json::from_value::<ConnectAck>(message.payload)
                    .expect("invalid connect ack");
            }
        }
    })
    .await
    .expect("no connect ack");

    (session, events, ack)
}

/// Editor-side shim answering `host/*` requests from the hub
pub struct FakeHost {
    pub session: Arc<ChannelSession>,
    pub session_id: String,
    task: JoinHandle<()>,
}

impl FakeHost {
    pub async fn connect(hub: &TestHub) -> Self {
        let transport = Transport::connect_tcp(&hub.tcp_addr.to_string()).await.unwrap();
        let (session, mut events, ack) = handshake(transport, ClientType::Host).await;

        let responder = session.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = events.recv().await {
                if message.kind != MessageKind::Request {
                    continue;
                }
                let Some(id) = message.id.clone() else {
                    continue;
                };
                let reply = match serde_json::from_value::<JsonRpcRequest>(message.payload) {
                    Ok(request) => answer(&id, request),
                    Err(e) => TransportMessage::error(Some(id), INTERNAL_ERROR, e.to_string()),
                };
                responder.send(reply).await;
            }
        });

        Self {
            session,
            session_id: ack.session_id,
            task,
        }
    }

    pub async fn disconnect(self) {
        self.session.close("Host shutting down").await;
        let _ = timeout(Duration::from_secs(2), self.task).await;
    }
}

fn answer(id: &str, request: JsonRpcRequest) -> TransportMessage {
    let rpc_id = request.id.clone().unwrap_or(Value::Null);
    let result = match request.method.as_str() {
        METHOD_HOST_GET_COMMANDS => Ok(json!(HOST_COMMANDS)),
        METHOD_HOST_EXECUTE_COMMAND => {
            let command_id = request.params["commandId"].as_str().unwrap_or_default();
            let args = request.params["args"].as_array().cloned().unwrap_or_default();
            match command_id {
                "test.echo" => Ok(args.first().cloned().unwrap_or(Value::Null)),
                "test.uri" => Ok(json!({
                    "uri": {
                        "scheme": "file",
                        "authority": "",
                        "path": "/work/src/main.rs",
                        "query": "",
                        "fragment": ""
                    },
                    "range": {
                        "start": { "line": 3, "character": 0 },
                        "end": { "line": 3, "character": 12 }
                    }
                })),
                "git.commit" => Err("Nothing to commit".to_string()),
                _ => Ok(Value::Null),
            }
        }
        other => Err(format!("Unknown method: {}", other)),
    };

    match result {
        Ok(value) => TransportMessage::response(id, &JsonRpcResponse::success(rpc_id, value)),
        Err(message) => TransportMessage::response(
            id,
            &JsonRpcResponse::failure(rpc_id, INTERNAL_ERROR, message),
        ),
    }
}

/// A client channel speaking to the hub the way the bridge does
pub struct BridgeChannel {
    pub session: Arc<ChannelSession>,
    pub events: mpsc::Receiver<TransportMessage>,
    pub session_id: String,
}

impl BridgeChannel {
    pub async fn over(transport: Transport) -> Self {
        let (session, events, ack) = handshake(transport, ClientType::Bridge).await;
        Self {
            session,
            events,
            session_id: ack.session_id,
        }
    }

    pub async fn tcp(hub: &TestHub) -> Self {
        Self::over(Transport::connect_tcp(&hub.tcp_addr.to_string()).await.unwrap()).await
    }

    pub async fn websocket(hub: &TestHub) -> Self {
        Self::over(Transport::connect_websocket(&hub.ws_url()).await.unwrap()).await
    }

    pub async fn call(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        Ok(self.session.call(method, params).await?)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> anyhow::Result<Value> {
        self.call("tools/call", json!({ "name": name, "arguments": arguments }))
            .await
    }
}

// ============================================================================
// HTTP response shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub host_connected: bool,
    pub stats: StatsResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub total_messages: u64,
    pub total_errors: u64,
    pub error_rate: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub remote_address: String,
    pub client_type: String,
    pub pid: u32,
    pub status: String,
    pub pending_requests: usize,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub code: u32,
    pub message: String,
}
