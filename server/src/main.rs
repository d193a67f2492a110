//! cmdbridge hub server
//!
//! Listens for bridge and host channels over TCP and WebSocket and,
//! depending on `CMDBRIDGE_MCP_MODE`, serves MCP on stdio or HTTP as well.

use std::net::SocketAddr;
use std::sync::Arc;

use cmdbridge_server::{api, AppState, Config, McpMode};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first to check MCP mode
    dotenvy::dotenv().ok();
    let config = Arc::new(Config::load()?);

    // Initialize tracing - use stderr for MCP stdio mode to avoid polluting stdout
    if config.mcp_mode == McpMode::Stdio {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(
                EnvFilter::builder()
                    .with_default_directive(Level::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(
                EnvFilter::builder()
                    .with_default_directive(Level::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    }

    let tcp_addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let http_addr: SocketAddr = format!("{}:{}", config.host, config.http_port).parse()?;

    info!("Starting cmdbridge hub");
    info!("Channels on tcp://{} and ws://{}/ws", tcp_addr, http_addr);

    let tcp = TcpListener::bind(tcp_addr).await?;
    let http = TcpListener::bind(http_addr).await?;
    let state = AppState::new(config.clone());

    // In stdio mode the hub lives as long as its MCP client
    if config.mcp_mode == McpMode::Stdio {
        let (stdio_done_tx, stdio_done_rx) = tokio::sync::oneshot::channel::<()>();
        let hub = tokio::spawn(cmdbridge_server::run(
            state.clone(),
            tcp,
            http,
            async move {
                let _ = stdio_done_rx.await;
            },
        ));

        let result = tokio::select! {
            result = api::mcp::serve_stdio(state) => result,
            _ = shutdown_signal() => Ok(()),
        };
        let _ = stdio_done_tx.send(());
        hub.await??;
        return result;
    }

    cmdbridge_server::run(state, tcp, http, shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
