//! Channel sessions
//!
//! A [`ChannelSession`] owns one live connection over any [`Transport`]. It
//! runs three tasks: a reader that decodes frames, a writer that drains the
//! outbound queue, and a heartbeat ticker. Responses are matched against the
//! session's [`Correlator`]; every other inbound frame is handed to the owner
//! through the event channel returned by [`ChannelSession::open`].

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec::{self, LineDecoder};
use crate::correlator::{Correlator, DEFAULT_REQUEST_TIMEOUT};
use crate::error::CorrelationError;
use crate::protocol::{
    JsonRpcRequest, JsonRpcResponse, MessageKind, TransportMessage, INTERNAL_ERROR,
};
use crate::transport::{Transport, TransportReader, TransportWriter};

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Sessions with more than this share of errors are reported unhealthy
pub const MAX_ERROR_RATIO: f64 = 0.5;

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub heartbeat_interval: Duration,
    pub request_timeout: Duration,
    pub outbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            outbound_capacity: 100,
        }
    }
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
    Error = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Open,
            2 => SessionState::Closing,
            3 => SessionState::Closed,
            _ => SessionState::Error,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error)
    }
}

/// Snapshot of a session's message counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MessageCounts {
    pub sent: u64,
    pub received: u64,
    pub errors: u64,
}

impl MessageCounts {
    pub fn total(&self) -> u64 {
        self.sent + self.received
    }

    pub fn error_ratio(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.errors as f64 / self.total() as f64
    }
}

/// Diagnostic health classification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionHealth {
    pub healthy: bool,
    pub idle_ms: u64,
    pub error_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One live connection
#[derive(Debug)]
pub struct ChannelSession {
    id: String,
    remote_addr: String,
    connected_at: DateTime<Utc>,
    opened: Instant,
    state: AtomicU8,
    /// Milliseconds since `opened` of the last inbound frame
    last_activity_ms: AtomicU64,
    sent: AtomicU64,
    received: AtomicU64,
    errors: AtomicU64,
    dropped_frames: AtomicU64,
    outbound: mpsc::Sender<TransportMessage>,
    correlator: Correlator,
    shutdown: watch::Sender<bool>,
}

impl ChannelSession {
    /// Start a session over `transport`.
    ///
    /// Returns the session and the receiver for inbound frames that are not
    /// handled internally. The receiver yields `None` once the session ends.
    pub fn open(
        transport: Transport,
        config: SessionConfig,
    ) -> (Arc<ChannelSession>, mpsc::Receiver<TransportMessage>) {
        let (reader, writer, remote_addr) = transport.into_parts();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity);
        let (events_tx, events_rx) = mpsc::channel(config.outbound_capacity);
        let (shutdown, _) = watch::channel(false);

        let session = Arc::new(ChannelSession {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            connected_at: Utc::now(),
            opened: Instant::now(),
            state: AtomicU8::new(SessionState::Connecting as u8),
            last_activity_ms: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            outbound: outbound_tx,
            correlator: Correlator::new(config.request_timeout),
            shutdown,
        });

        // Subscribe before spawning so an immediate close is never missed
        tokio::spawn(
            session
                .clone()
                .write_loop(writer, outbound_rx, session.shutdown.subscribe()),
        );
        tokio::spawn(
            session
                .clone()
                .read_loop(reader, events_tx, session.shutdown.subscribe()),
        );
        tokio::spawn(session.clone().heartbeat_loop(
            config.heartbeat_interval,
            session.shutdown.subscribe(),
        ));

        session.set_state(SessionState::Open);
        debug!("Session {} open ({})", session.id, session.remote_addr);

        (session, events_rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    pub fn counts(&self) -> MessageCounts {
        MessageCounts {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Lines the decoder discarded as unparsable
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn pending_requests(&self) -> usize {
        self.correlator.len()
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the last inbound frame (or since open if none arrived)
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed));
        self.opened.elapsed().saturating_sub(last)
    }

    /// Classify the session for diagnostics; never closes anything
    pub fn health(&self, idle_timeout: Duration) -> SessionHealth {
        let idle = self.idle_for();
        let error_ratio = self.counts().error_ratio();

        let reason = if idle > idle_timeout {
            Some(format!("idle for {:?}", idle))
        } else if error_ratio > MAX_ERROR_RATIO {
            Some(format!("error ratio {:.0}%", error_ratio * 100.0))
        } else {
            None
        };

        SessionHealth {
            healthy: reason.is_none(),
            idle_ms: idle.as_millis() as u64,
            error_ratio,
            reason,
        }
    }

    /// Queue a frame. Dropped and counted as an error when the session is not open.
    pub async fn send(&self, message: TransportMessage) -> bool {
        if !self.is_open() {
            debug!(
                "Session {} is {:?}, dropping {:?} frame",
                self.id,
                self.state(),
                message.kind
            );
            self.record_error();
            return false;
        }
        self.enqueue(message).await
    }

    /// Send a JSON-RPC request and wait for the correlated result
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, CorrelationError> {
        let pending = self.correlator.register(method);
        let request = JsonRpcRequest::new(pending.id(), method, params);
        let payload = serde_json::to_value(&request).unwrap_or(Value::Null);

        if !self.send(TransportMessage::request(pending.id(), payload)).await {
            self.correlator.complete(
                pending.id(),
                Err(CorrelationError::Aborted(format!(
                    "Session {} is not open",
                    self.id
                ))),
            );
        }

        self.correlator.wait(pending).await
    }

    /// Deliberately close the session, rejecting everything still pending
    pub async fn close(&self, reason: &str) {
        let previous = self.state();
        if previous != SessionState::Open && previous != SessionState::Connecting {
            return;
        }
        self.set_state(SessionState::Closing);
        info!("Closing session {}: {}", self.id, reason);

        // A full queue means the peer is not reading; skip the notice
        match self.outbound.try_send(TransportMessage::disconnect(reason)) {
            Ok(()) => self.record_sent(),
            Err(e) => {
                debug!("Session {}: disconnect notice not queued: {}", self.id, e);
                self.record_error();
            }
        }
        self.shutdown.send_replace(true);
        self.correlator.abort_all(reason);
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn touch(&self) {
        let now = self.opened.elapsed().as_millis() as u64;
        self.last_activity_ms.store(now, Ordering::Relaxed);
    }

    async fn enqueue(&self, message: TransportMessage) -> bool {
        match self.outbound.send(message).await {
            Ok(()) => {
                self.record_sent();
                true
            }
            Err(_) => {
                self.record_error();
                false
            }
        }
    }

    /// Route one decoded inbound frame
    async fn dispatch(&self, message: TransportMessage, events: &mpsc::Sender<TransportMessage>) {
        self.touch();
        self.record_received();

        match message.kind {
            MessageKind::Heartbeat => {
                if !message.is_heartbeat_ack() {
                    self.send(TransportMessage::heartbeat_ack()).await;
                }
            }
            MessageKind::Response => {
                let Some(id) = message.id.as_deref() else {
                    warn!("Session {}: response without id", self.id);
                    self.record_error();
                    return;
                };
                let outcome = match serde_json::from_value::<JsonRpcResponse>(message.payload) {
                    Ok(response) => response.into_outcome().map_err(|e| CorrelationError::Remote {
                        code: e.code,
                        message: e.message,
                    }),
                    Err(e) => Err(CorrelationError::Remote {
                        code: INTERNAL_ERROR,
                        message: format!("Malformed response: {}", e),
                    }),
                };
                self.correlator.complete(id, outcome);
            }
            MessageKind::Error if message.id.is_some() => {
                let id = message.id.as_deref().unwrap_or_default();
                let code = message
                    .payload
                    .get("code")
                    .and_then(Value::as_i64)
                    .unwrap_or(INTERNAL_ERROR);
                let text = message
                    .payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string();
                self.correlator
                    .complete(id, Err(CorrelationError::Remote { code, message: text }));
            }
            _ => {
                if events.send(message).await.is_err() {
                    debug!("Session {}: event receiver dropped", self.id);
                }
            }
        }
    }

    async fn read_loop(
        self: Arc<Self>,
        mut reader: Box<dyn TransportReader>,
        events: mpsc::Sender<TransportMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut decoder = LineDecoder::new();
        let mut failed = false;

        'read: loop {
            let chunk = tokio::select! {
                chunk = reader.read_chunk() => chunk,
                _ = shutdown.changed() => break,
            };

            let at_eof = matches!(chunk, Ok(None));
            let messages = match chunk {
                Ok(Some(bytes)) => {
                    // Any inbound bytes count as activity, decodable or not
                    self.touch();
                    decoder.feed(&bytes)
                }
                Ok(None) => {
                    debug!("Session {}: end of stream", self.id);
                    decoder.finish()
                }
                Err(e) => {
                    warn!("Session {}: read failed: {}", self.id, e);
                    failed = true;
                    break;
                }
            };
            self.dropped_frames.store(decoder.dropped(), Ordering::Relaxed);

            for message in messages {
                let peer_closing = message.kind == MessageKind::Disconnect;
                if peer_closing {
                    info!(
                        "Session {}: peer disconnected ({})",
                        self.id,
                        message.disconnect_reason().unwrap_or("no reason")
                    );
                }
                self.dispatch(message, &events).await;
                if peer_closing {
                    break 'read;
                }
            }
            if at_eof {
                break;
            }
        }

        let final_state = match self.state() {
            SessionState::Closing => SessionState::Closed,
            _ if failed => SessionState::Error,
            _ => SessionState::Closed,
        };
        self.set_state(final_state);
        self.shutdown.send_replace(true);

        let aborted = self.correlator.abort_all("Channel lost");
        if aborted > 0 {
            warn!(
                "Session {}: {} pending requests rejected on teardown",
                self.id, aborted
            );
        }
        debug!("Session {} reader finished ({:?})", self.id, final_state);
    }

    async fn write_loop(
        self: Arc<Self>,
        mut writer: Box<dyn TransportWriter>,
        mut outbound: mpsc::Receiver<TransportMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let message = tokio::select! {
                biased;
                message = outbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
                _ = shutdown.changed() => break,
            };

            let closing = message.kind == MessageKind::Disconnect;
            let line = match codec::encode(&message) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Session {}: failed to encode frame: {}", self.id, e);
                    self.record_error();
                    continue;
                }
            };

            if let Err(e) = writer.write_all(line.as_bytes()).await {
                warn!("Session {}: write failed: {}", self.id, e);
                self.record_error();
                if !self.state().is_terminal() {
                    self.set_state(SessionState::Error);
                }
                self.shutdown.send_replace(true);
                break;
            }

            if closing {
                break;
            }
        }

        let _ = writer.close().await;
        debug!("Session {} writer finished", self.id);
    }

    async fn heartbeat_loop(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(period);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.is_open() {
                        break;
                    }
                    self.send(TransportMessage::heartbeat()).await;
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}
