//! Request/response correlation
//!
//! Each outgoing request gets a process-unique id and a pending entry holding
//! the sender half of a oneshot channel. The entry is removed from the map
//! before it is settled, so a pending request resolves at most once no matter
//! how many responses, timeouts or aborts race for it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::CorrelationError;

/// Default deadline for a correlated request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

pub type Outcome = Result<Value, CorrelationError>;

/// A request waiting for its response
#[derive(Debug)]
struct PendingRequest {
    method: String,
    created_at: Instant,
    tx: oneshot::Sender<Outcome>,
}

/// Receiving half of a tracked request
#[derive(Debug)]
pub struct PendingResponse {
    id: String,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingResponse {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Tracks in-flight requests for one channel
#[derive(Debug)]
pub struct Correlator {
    pending: DashMap<String, PendingRequest>,
    request_timeout: Duration,
}

impl Correlator {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            request_timeout,
        }
    }

    /// Allocate a fresh id and start tracking a request for `method`
    pub fn register(&self, method: &str) -> PendingResponse {
        let id = format!("req-{}", NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            PendingRequest {
                method: method.to_string(),
                created_at: Instant::now(),
                tx,
            },
        );
        PendingResponse { id, rx }
    }

    /// Settle the request `id`. Returns false when it is no longer tracked.
    pub fn complete(&self, id: &str, outcome: Outcome) -> bool {
        match self.pending.remove(id) {
            Some((_, pending)) => {
                debug!(
                    "Request {} ({}) settled after {:?}",
                    id,
                    pending.method,
                    pending.created_at.elapsed()
                );
                let _ = pending.tx.send(outcome);
                true
            }
            None => {
                debug!("Dropping response for unknown request id: {}", id);
                false
            }
        }
    }

    /// Reject `id` with a timeout if it is still pending
    pub fn expire(&self, id: &str) -> bool {
        match self.pending.remove(id) {
            Some((_, pending)) => {
                warn!("Request {} ({}) timed out", id, pending.method);
                let _ = pending.tx.send(Err(CorrelationError::Timeout {
                    method: pending.method,
                    timeout: self.request_timeout,
                }));
                true
            }
            None => false,
        }
    }

    /// Reject every pending request with `reason`
    pub fn abort_all(&self, reason: &str) -> usize {
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        let mut aborted = 0;
        for id in ids {
            if self.complete(&id, Err(CorrelationError::Aborted(reason.to_string()))) {
                aborted += 1;
            }
        }
        if aborted > 0 {
            debug!("Aborted {} pending requests: {}", aborted, reason);
        }
        aborted
    }

    /// Wait for the outcome of a registered request, applying the deadline
    pub async fn wait(&self, pending: PendingResponse) -> Outcome {
        let PendingResponse { id, mut rx } = pending;
        let guard = PendingGuard {
            correlator: self,
            id: &id,
        };

        let outcome = match timeout(self.request_timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(CorrelationError::Aborted(
                "Response channel closed".to_string(),
            )),
            Err(_) => {
                self.expire(&id);
                // Either the timeout above or a response that raced it is now queued
                rx.await.unwrap_or_else(|_| {
                    Err(CorrelationError::Aborted("Response channel closed".to_string()))
                })
            }
        };

        drop(guard);
        outcome
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

/// Untracks a request whose waiter was dropped before it settled
struct PendingGuard<'a> {
    correlator: &'a Correlator,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.pending.remove(self.id);
    }
}
