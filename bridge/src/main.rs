//! cmdbridge stdio bridge
//!
//! Usage: `cmdbridge [endpoint]` where endpoint is a port, `host:port`,
//! `tcp://host:port` or a `ws://` URL. Defaults to `127.0.0.1:19847`.

use std::process::ExitCode;
use std::sync::Arc;

use cmdbridge::{BridgeConfig, ChannelToolBackend, ConnectionManager, Endpoint};
use cmdbridge_common::CommandToolsHandler;
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // stdout carries MCP traffic, so logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let arg = std::env::args().nth(1);
    let endpoint = Endpoint::from_arg(arg.as_deref())?;
    let config = BridgeConfig::from_env(endpoint);

    info!("Starting cmdbridge bridge for {}", config.endpoint);

    let manager = ConnectionManager::new(config);
    let mut runner = tokio::spawn(manager.clone().run());

    let backend = Arc::new(ChannelToolBackend::new(manager.clone()));
    let service = CommandToolsHandler::new(backend).serve(stdio()).await?;
    info!("MCP server ready on stdio");

    let mut runner_done = false;
    let result = tokio::select! {
        waited = service.waiting() => {
            info!("MCP client closed stdio");
            waited.map(|_| ()).map_err(anyhow::Error::from)
        }
        _ = shutdown_signal() => Ok(()),
        finished = &mut runner => {
            runner_done = true;
            match finished {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => Err(e.into()),
            }
        }
    };

    manager.shutdown().await;
    if !runner_done {
        let _ = runner.await;
    }

    info!("Bridge stopped");
    result
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
