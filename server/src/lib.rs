//! cmdbridge hub
//!
//! Accepts channel sessions from bridges and host shims over TCP and
//! WebSocket, keeps them in a bounded registry, and answers MCP tool calls
//! by running editor commands through the connected host.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

pub mod api;
pub mod config;
pub mod error;
pub mod infra;
pub mod service;

pub use config::{Config, McpMode};
pub use error::{Error, Result};

use infra::host::{CommandHost, RemoteCommandHost};
use infra::registry::ConnectionRegistry;
use service::dispatcher::Dispatcher;
use service::executor::ToolExecutor;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    pub executor: Arc<ToolExecutor>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// State whose commands run on the host shim registered with the hub
    pub fn new(config: Arc<Config>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(
            config.max_connections,
            config.idle_timeout(),
        ));
        let host = Arc::new(RemoteCommandHost::new(registry.clone()));
        Self::assemble(config, registry, host)
    }

    /// State backed by an arbitrary command host
    pub fn with_host(config: Arc<Config>, host: Arc<dyn CommandHost>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(
            config.max_connections,
            config.idle_timeout(),
        ));
        Self::assemble(config, registry, host)
    }

    fn assemble(
        config: Arc<Config>,
        registry: Arc<ConnectionRegistry>,
        host: Arc<dyn CommandHost>,
    ) -> Self {
        let executor = Arc::new(ToolExecutor::new(host));
        let dispatcher = Arc::new(Dispatcher::new(executor.clone()));
        Self {
            config,
            registry,
            executor,
            dispatcher,
        }
    }
}

/// Serve channels on `tcp` and the HTTP surface on `http` until `shutdown` resolves
pub async fn run<F>(
    state: AppState,
    tcp: TcpListener,
    http: TcpListener,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let sweeper = state.registry.start_sweeper(state.config.sweep_interval());

    let (stop_tx, stop_rx) = watch::channel(false);
    let tcp_task = tokio::spawn(api::tcp::serve(state.clone(), tcp, stop_rx));

    let mut app = api::http::create_router(state.clone());
    if state.config.mcp_mode == McpMode::Http {
        info!("MCP HTTP endpoint enabled at {}", state.config.mcp_path);
        app = app.nest_service(
            &state.config.mcp_path,
            api::mcp::create_mcp_service(state.clone()),
        );
    }

    if let Ok(addr) = http.local_addr() {
        info!("HTTP listening on {}", addr);
    }

    let registry = state.registry.clone();
    let result = axum::serve(
        http,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.await;
        stop_tx.send_replace(true);
        // Upgraded WebSocket connections end with their sessions
        registry.close_all("Server shutting down").await;
    })
    .await;

    sweeper.abort();
    if let Err(e) = tcp_task.await {
        error!("TCP listener task failed: {}", e);
    }
    state.registry.close_all("Server shutting down").await;

    result?;
    info!("Server shutdown complete");
    Ok(())
}
