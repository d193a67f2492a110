//! Hub connection management
//!
//! [`ConnectionManager`] keeps one channel session to the hub alive. When the
//! channel is lost, pending calls are rejected by the session teardown and a
//! new session is opened after a capped exponential delay. Once the attempt
//! budget is spent the manager gives up with a fatal error.

use std::sync::Arc;

use cmdbridge_common::protocol::{
    ClientType, ConnectAck, ConnectPayload, MessageKind, TransportMessage, INTERNAL_ERROR,
};
use cmdbridge_common::{ChannelSession, Reconnector};
use serde_json::Value;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// Capabilities announced in the `connect` handshake
const CAPABILITIES: [&str; 1] = ["tools"];

type SessionEvents = mpsc::Receiver<TransportMessage>;

/// Connection manager for communicating with the hub
pub struct ConnectionManager {
    config: BridgeConfig,
    reconnector: Reconnector,
    current: RwLock<Option<Arc<ChannelSession>>>,
    shutdown: watch::Sender<bool>,
}

impl ConnectionManager {
    pub fn new(config: BridgeConfig) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            reconnector: Reconnector::new(config.reconnect),
            config,
            current: RwLock::new(None),
            shutdown,
        })
    }

    /// The live session, if any
    pub async fn session(&self) -> Option<Arc<ChannelSession>> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|session| session.is_open())
            .cloned()
    }

    pub async fn is_connected(&self) -> bool {
        self.session().await.is_some()
    }

    /// Failed attempts since the last successful connect
    pub fn attempts(&self) -> u32 {
        self.reconnector.attempts()
    }

    /// Send a JSON-RPC request to the hub over the current session
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let session = self.session().await.ok_or(BridgeError::NotConnected)?;
        Ok(session.call(method, params).await?)
    }

    /// Keep a session alive until shutdown or until reconnection gives up
    pub async fn run(self: Arc<Self>) -> Result<(), BridgeError> {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.connect_once().await {
                Ok((session, events)) => {
                    // shutdown() may have run while the handshake was in flight
                    if *shutdown.borrow() {
                        session.close("Bridge shutting down").await;
                        break;
                    }
                    self.reconnector.reset();
                    *self.current.write().await = Some(session.clone());
                    info!(
                        "Connected to {} (session {})",
                        self.config.endpoint,
                        session.id()
                    );

                    self.watch_session(&session, events, &mut shutdown).await;
                    self.current.write().await.take();

                    if *shutdown.borrow() {
                        break;
                    }
                    warn!("Connection to {} lost", self.config.endpoint);
                }
                Err(e) => warn!("Connection attempt to {} failed: {}", self.config.endpoint, e),
            }

            let delay = match self.reconnector.next_delay() {
                Ok(delay) => delay,
                Err(e) => {
                    error!(
                        "Giving up on {}: {}. Ensure the host extension is running.",
                        self.config.endpoint, e
                    );
                    return Err(e.into());
                }
            };
            info!(
                "Reconnecting in {:?} (attempt {}/{})",
                delay,
                self.reconnector.attempts(),
                self.reconnector.policy().max_attempts
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("Connection manager stopped");
        Ok(())
    }

    /// Close the current session and stop reconnecting
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let session = self.current.write().await.take();
        if let Some(session) = session {
            session.close("Bridge shutting down").await;
        }
    }

    /// Open a transport, start a session and complete the `connect` handshake
    async fn connect_once(&self) -> Result<(Arc<ChannelSession>, SessionEvents), BridgeError> {
        debug!("Connecting to {}", self.config.endpoint);
        let transport = timeout(self.config.connect_timeout, self.config.endpoint.connect())
            .await
            .map_err(|_| BridgeError::ConnectTimeout(self.config.connect_timeout))??;

        let (session, mut events) = ChannelSession::open(transport, self.config.session.clone());
        let hello = ConnectPayload::new(
            ClientType::Bridge,
            CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        );
        session.send(TransportMessage::connect(&hello)).await;

        match timeout(self.config.handshake_timeout, wait_for_ack(&mut events)).await {
            Ok(Ok(ack)) => {
                debug!("Handshake acknowledged, hub session {}", ack.session_id);
                Ok((session, events))
            }
            Ok(Err(e)) => {
                session.close("Handshake failed").await;
                Err(e)
            }
            Err(_) => {
                session.close("Handshake timed out").await;
                Err(BridgeError::Handshake(format!(
                    "no acknowledgement within {:?}",
                    self.config.handshake_timeout
                )))
            }
        }
    }

    /// Drain session events until the channel ends
    async fn watch_session(
        &self,
        session: &Arc<ChannelSession>,
        mut events: SessionEvents,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        loop {
            let message = tokio::select! {
                message = events.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
                _ = shutdown.changed() => {
                    session.close("Bridge shutting down").await;
                    return;
                }
            };
            match message.kind {
                MessageKind::Disconnect => {
                    warn!(
                        "Hub closed the channel: {}",
                        message.disconnect_reason().unwrap_or("no reason")
                    );
                }
                MessageKind::Request => {
                    warn!("Rejecting unexpected request from hub");
                    session
                        .send(TransportMessage::error(
                            message.id,
                            INTERNAL_ERROR,
                            "The bridge does not accept requests",
                        ))
                        .await;
                }
                MessageKind::Error => {
                    warn!("Hub reported an error: {}", message.payload);
                }
                _ => debug!("Ignoring {:?} frame", message.kind),
            }
        }
        // Make sure a half-open channel is torn down before reconnecting
        session.close("Channel lost").await;
    }
}

async fn wait_for_ack(events: &mut SessionEvents) -> Result<ConnectAck, BridgeError> {
    while let Some(message) = events.recv().await {
        match message.kind {
            MessageKind::Connect => {
                return serde_json::from_value(message.payload)
                    .map_err(|e| BridgeError::Handshake(format!("invalid acknowledgement: {}", e)));
            }
            MessageKind::Disconnect => {
                return Err(BridgeError::Handshake(
                    message
                        .disconnect_reason()
                        .unwrap_or("closed during handshake")
                        .to_string(),
                ));
            }
            _ => debug!("Ignoring {:?} frame before handshake", message.kind),
        }
    }
    Err(BridgeError::Handshake("channel closed during handshake".to_string()))
}
