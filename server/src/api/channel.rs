//! Accepted channel handling
//!
//! Every transport the hub accepts (TCP socket, WebSocket) ends up here: the
//! session is opened, the `connect` handshake is answered, the session is
//! registered, and inbound requests are dispatched until the channel ends.

use std::time::Duration;

use cmdbridge_common::protocol::{ConnectAck, ConnectPayload, MessageKind, TransportMessage};
use cmdbridge_common::{ChannelSession, Transport};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::AppState;

/// How long a new channel may take to send its `connect` frame
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Run one accepted channel to completion
pub async fn serve_channel(state: AppState, transport: Transport) {
    let remote = transport.remote_addr().to_string();
    let (session, mut events) = ChannelSession::open(transport, state.config.session_config());

    let hello = match await_handshake(&mut events).await {
        Ok(hello) => hello,
        Err(e) => {
            warn!("Rejecting channel from {}: {}", remote, e);
            session.close(&e.to_string()).await;
            return;
        }
    };

    // Registered before the ack so the peer is routable once it hears back
    state
        .registry
        .add(session.clone(), hello.client_type, hello.pid)
        .await;
    acknowledge(&session).await;
    info!(
        "Channel {} from {} established ({} v{})",
        session.id(),
        remote,
        hello.client_type,
        hello.version
    );

    while let Some(message) = events.recv().await {
        match message.kind {
            MessageKind::Request => {
                let dispatcher = state.dispatcher.clone();
                let session = session.clone();
                tokio::spawn(async move {
                    if let Some(response) = dispatcher.handle_message(message).await {
                        session.send(response).await;
                    }
                });
            }
            // A client may repeat its handshake; answer it again
            MessageKind::Connect => acknowledge(&session).await,
            MessageKind::Disconnect => {
                debug!(
                    "Channel {} disconnecting: {}",
                    session.id(),
                    message.disconnect_reason().unwrap_or("no reason")
                );
            }
            MessageKind::Error => {
                warn!("Channel {} reported an error: {}", session.id(), message.payload);
                session.record_error();
            }
            MessageKind::Response | MessageKind::Heartbeat => {}
        }
    }

    if state.registry.remove(session.id()).is_some() {
        info!("Channel {} from {} closed", session.id(), remote);
    }
}

async fn await_handshake(
    events: &mut tokio::sync::mpsc::Receiver<TransportMessage>,
) -> Result<ConnectPayload> {
    let first = timeout(HANDSHAKE_TIMEOUT, events.recv())
        .await
        .map_err(|_| Error::Handshake("timed out waiting for connect".to_string()))?
        .ok_or_else(|| Error::Handshake("channel closed before connect".to_string()))?;

    if first.kind != MessageKind::Connect {
        return Err(Error::Handshake(format!(
            "expected connect, got {:?}",
            first.kind
        )));
    }
    serde_json::from_value(first.payload)
        .map_err(|e| Error::Handshake(format!("invalid connect payload: {}", e)))
}

async fn acknowledge(session: &ChannelSession) {
    let ack = ConnectAck {
        session_id: session.id().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    session.send(TransportMessage::connect_ack(&ack)).await;
}
