//! Connection registry
//!
//! Tracks every live [`ChannelSession`] the hub accepted, enforces the
//! connection limit by evicting the oldest session, and periodically sweeps
//! sessions that went quiet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cmdbridge_common::protocol::{ClientType, TransportMessage};
use cmdbridge_common::session::{MessageCounts, SessionHealth};
use cmdbridge_common::ChannelSession;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Registry-level view of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Active,
    Inactive,
    Error,
    Closing,
}

struct RegistryEntry {
    session: Arc<ChannelSession>,
    client_type: ClientType,
    pid: u32,
    /// Insertion order, breaks ties on `connected_at`
    seq: u64,
    status: ConnectionStatus,
}

/// Aggregate counters across all sessions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub total_messages: u64,
    pub total_errors: u64,
    pub error_rate: f64,
}

/// Diagnostic summary of one session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub remote_address: String,
    pub client_type: ClientType,
    pub pid: u32,
    pub connected_at: DateTime<Utc>,
    pub status: ConnectionStatus,
    pub counts: MessageCounts,
    pub pending_requests: usize,
    pub health: SessionHealth,
}

pub struct ConnectionRegistry {
    sessions: DashMap<String, RegistryEntry>,
    max_connections: usize,
    idle_timeout: Duration,
    next_seq: AtomicU64,
    /// Serializes the limit check, eviction and insert of `add`
    admission: Mutex<()>,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize, idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            max_connections: max_connections.max(1),
            idle_timeout,
            next_seq: AtomicU64::new(0),
            admission: Mutex::new(()),
        }
    }

    /// Register a session, evicting the oldest one when the limit is reached.
    /// Returns the id of the evicted session, if any.
    pub async fn add(
        &self,
        session: Arc<ChannelSession>,
        client_type: ClientType,
        pid: u32,
    ) -> Option<String> {
        let id = session.id().to_string();

        let evicted = {
            let _admission = self.admission.lock().await;

            let mut evicted = Vec::new();
            while self.sessions.len() >= self.max_connections {
                let Some(oldest) = self.oldest_id() else {
                    break;
                };
                // Gone already if its channel ended in the meantime
                if let Some((_, entry)) = self.sessions.remove(&oldest) {
                    evicted.push(entry.session);
                }
            }

            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            self.sessions.insert(
                id.clone(),
                RegistryEntry {
                    session,
                    client_type,
                    pid,
                    seq,
                    status: ConnectionStatus::Active,
                },
            );
            info!(
                "Session registered: {} ({}, pid {}), {} live",
                id,
                client_type,
                pid,
                self.sessions.len()
            );
            evicted
        };

        // Closing may wait on a slow peer, so it happens outside the lock
        let mut first = None;
        for oldest in evicted {
            warn!(
                "Connection limit ({}) reached, evicting oldest session {}",
                self.max_connections,
                oldest.id()
            );
            oldest.close("Evicted: connection limit reached").await;
            first.get_or_insert_with(|| oldest.id().to_string());
        }
        first
    }

    fn oldest_id(&self) -> Option<String> {
        self.sessions
            .iter()
            .min_by_key(|entry| (entry.session.connected_at(), entry.seq))
            .map(|entry| entry.key().clone())
    }

    /// Forget a session without closing it
    pub fn remove(&self, id: &str) -> Option<Arc<ChannelSession>> {
        let (_, entry) = self.sessions.remove(id)?;
        debug!("Session unregistered: {}", id);
        Some(entry.session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<ChannelSession>> {
        self.sessions.get(id).map(|entry| entry.session.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn record_sent(&self, id: &str) {
        if let Some(entry) = self.sessions.get(id) {
            entry.session.record_sent();
        }
    }

    pub fn record_received(&self, id: &str) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.session.record_received();
            if entry.status == ConnectionStatus::Inactive {
                entry.status = ConnectionStatus::Active;
            }
        }
    }

    pub fn record_error(&self, id: &str) {
        if let Some(entry) = self.sessions.get(id) {
            entry.session.record_error();
        }
    }

    pub fn set_status(&self, id: &str, status: ConnectionStatus) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    pub fn status(&self, id: &str) -> Option<ConnectionStatus> {
        self.sessions.get(id).map(|entry| entry.status)
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total: 0,
            active: 0,
            inactive: 0,
            total_messages: 0,
            total_errors: 0,
            error_rate: 0.0,
        };

        for entry in self.sessions.iter() {
            stats.total += 1;
            match entry.status {
                ConnectionStatus::Active => stats.active += 1,
                ConnectionStatus::Inactive => stats.inactive += 1,
                _ => {}
            }
            let counts = entry.session.counts();
            stats.total_messages += counts.total();
            stats.total_errors += counts.errors;
        }

        if stats.total_messages > 0 {
            stats.error_rate = stats.total_errors as f64 / stats.total_messages as f64;
        }
        stats
    }

    pub fn sessions(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<(u64, SessionSummary)> = self
            .sessions
            .iter()
            .map(|entry| {
                let session = &entry.session;
                (
                    entry.seq,
                    SessionSummary {
                        id: session.id().to_string(),
                        remote_address: session.remote_addr().to_string(),
                        client_type: entry.client_type,
                        pid: entry.pid,
                        connected_at: session.connected_at(),
                        status: entry.status,
                        counts: session.counts(),
                        pending_requests: session.pending_requests(),
                        health: session.health(self.idle_timeout),
                    },
                )
            })
            .collect();
        summaries.sort_by_key(|(seq, _)| *seq);
        summaries.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Most recently registered open host session
    pub fn host_session(&self) -> Option<Arc<ChannelSession>> {
        self.sessions
            .iter()
            .filter(|entry| entry.client_type == ClientType::Host && entry.session.is_open())
            .max_by_key(|entry| entry.seq)
            .map(|entry| entry.session.clone())
    }

    /// Best-effort delivery to one session; failures are counted, not raised
    pub async fn send_to(&self, id: &str, message: TransportMessage) -> bool {
        let Some(session) = self.get(id) else {
            debug!("send_to: unknown session {}", id);
            return false;
        };
        session.send(message).await
    }

    /// Best-effort delivery to every session. Returns how many accepted it.
    pub async fn broadcast(&self, message: TransportMessage) -> usize {
        let sessions: Vec<Arc<ChannelSession>> =
            self.sessions.iter().map(|entry| entry.session.clone()).collect();

        let mut delivered = 0;
        for session in sessions {
            if session.send(message.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Close and drop every session idle beyond the idle timeout
    pub async fn sweep(&self) -> Vec<String> {
        let mut idle = Vec::new();
        for mut entry in self.sessions.iter_mut() {
            let session = entry.session.clone();
            if session.idle_for() > self.idle_timeout {
                entry.status = ConnectionStatus::Closing;
                idle.push(session);
            } else if !session.health(self.idle_timeout).healthy {
                entry.status = ConnectionStatus::Error;
            }
        }

        let mut closed = Vec::with_capacity(idle.len());
        for session in idle {
            info!(
                "Closing idle session {} (idle for {:?})",
                session.id(),
                session.idle_for()
            );
            session.close("Idle timeout").await;
            self.sessions.remove(session.id());
            closed.push(session.id().to_string());
        }
        closed
    }

    /// Run [`sweep`](Self::sweep) on `period` until the registry is dropped
    pub fn start_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let closed = registry.sweep().await;
                if !closed.is_empty() {
                    debug!("Sweep closed {} idle sessions", closed.len());
                }
            }
        })
    }

    pub async fn close_all(&self, reason: &str) {
        let sessions: Vec<Arc<ChannelSession>> =
            self.sessions.iter().map(|entry| entry.session.clone()).collect();
        self.sessions.clear();
        for session in sessions {
            session.close(reason).await;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
