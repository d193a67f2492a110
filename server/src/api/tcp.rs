//! Raw TCP channel listener

use cmdbridge_common::Transport;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use super::channel::serve_channel;
use crate::AppState;

/// Accept channels on `listener` until `shutdown` flips to true
pub async fn serve(state: AppState, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
    if let Ok(addr) = listener.local_addr() {
        info!("TCP channels listening on {}", addr);
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                    }
                    tokio::spawn(serve_channel(state.clone(), Transport::from_tcp(stream)));
                }
                Err(e) => warn!("Failed to accept TCP connection: {}", e),
            },
            _ = shutdown.changed() => break,
        }
    }

    info!("TCP listener stopped");
}
