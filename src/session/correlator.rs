//! Outbound request correlation.
//!
//! Tracks requests this peer initiated and matches inbound responses to
//! them by id. Each pending request owns a single-assignment result slot;
//! resolution hands the outcome to exactly one waiter.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::session::cancellation::{Cancellation, CancelledParams};
use crate::session::protocol::{methods, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::session::transport::Message;

/// How often a suspended waiter re-checks its own cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Pending {
    slot: oneshot::Sender<Result<Value>>,
    #[allow(dead_code)]
    created_at: Instant,
}

/// Correlates outbound requests with their eventual responses.
///
/// Safe for arbitrary concurrent callers on the same connection; id
/// allocation is a monotonically increasing counter that is never reused.
pub struct RequestCorrelator {
    outbound: mpsc::Sender<Message>,
    pending: Arc<DashMap<RequestId, Pending>>,
    next_id: AtomicI64,
    closed: CancellationToken,
    default_timeout: Duration,
}

impl RequestCorrelator {
    pub fn new(
        outbound: mpsc::Sender<Message>,
        closed: CancellationToken,
        default_timeout: Duration,
    ) -> Self {
        Self {
            outbound,
            pending: Arc::new(DashMap::new()),
            next_id: AtomicI64::new(1),
            closed,
            default_timeout,
        }
    }

    /// Send a request to the peer and return a future for its response.
    pub async fn begin(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(RequestId, ResponseFuture)> {
        self.begin_with_timeout(method, params, self.default_timeout)
            .await
    }

    /// Send a request with an explicit response deadline.
    pub async fn begin_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<(RequestId, ResponseFuture)> {
        if self.closed.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            Pending {
                slot: tx,
                created_at: Instant::now(),
            },
        );

        let request = JsonRpcRequest::new(id.clone(), method, params);
        if self.outbound.send(Message::Request(request)).await.is_err() {
            // Transport gone; the entry must not outlive the send.
            self.pending.remove(&id);
            return Err(Error::ConnectionClosed);
        }

        debug!("Outbound request {} (id: {})", method, id);
        let future = ResponseFuture {
            id: id.clone(),
            rx,
            pending: Arc::clone(&self.pending),
            outbound: self.outbound.clone(),
            timeout,
        };
        Ok((id, future))
    }

    /// Deliver a response envelope to its waiter.
    ///
    /// An unknown or already-resolved id is dropped and logged; it is not
    /// an error surfaced to anyone.
    pub fn resolve_response(&self, response: JsonRpcResponse) {
        let outcome = match response.error {
            Some(err) => Err(Error::Rpc(err)),
            None => Ok(response.result.unwrap_or(Value::Null)),
        };
        self.resolve(&response.id, outcome);
    }

    /// Assign the result slot for `id` and wake the waiter.
    pub fn resolve(&self, id: &RequestId, outcome: Result<Value>) {
        match self.pending.remove(id) {
            Some((_, entry)) => {
                // Waiter may have given up; nothing left to do then.
                let _ = entry.slot.send(outcome);
            }
            None => {
                debug!("Dropping response for unknown or resolved id: {}", id);
            }
        }
    }

    /// Fail every still-pending request, used on connection close.
    pub fn fail_all(&self, make_error: impl Fn() -> Error) {
        let ids: Vec<RequestId> = self.pending.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, entry)) = self.pending.remove(&id) {
                let _ = entry.slot.send(Err(make_error()));
            }
        }
    }

    /// Number of requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `id` is still tracked.
    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.pending.contains_key(id)
    }
}

/// Future for one outbound request's response.
pub struct ResponseFuture {
    id: RequestId,
    rx: oneshot::Receiver<Result<Value>>,
    pending: Arc<DashMap<RequestId, Pending>>,
    outbound: mpsc::Sender<Message>,
    timeout: Duration,
}

impl std::fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ResponseFuture {
    /// The id allocated for this request.
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Suspend until the response arrives or the deadline elapses.
    ///
    /// On timeout the pending entry is removed, so a late response hits
    /// the unknown-id path in [`RequestCorrelator::resolve`] and is
    /// silently dropped. The waiter observes exactly one outcome.
    pub async fn await_response(mut self) -> Result<Value> {
        match tokio::time::timeout(self.timeout, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            // Slot dropped without resolution: close tore it down.
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.pending.remove(&self.id);
                Err(Error::Timeout {
                    ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Like [`await_response`], but abandons the request if the caller's
    /// own inbound request gets cancelled while waiting.
    ///
    /// Abandonment best-effort notifies the peer with
    /// `notifications/cancelled` for the outbound id; the eventual
    /// response, if any, is dropped.
    ///
    /// [`await_response`]: Self::await_response
    pub async fn await_or_cancel(mut self, cancellation: &Cancellation) -> Result<Value> {
        enum Outcome {
            Resolved(Result<Value>),
            TimedOut,
            Cancelled,
        }

        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut poll = tokio::time::interval(CANCEL_POLL_INTERVAL);

        let outcome = loop {
            tokio::select! {
                resolved = &mut self.rx => {
                    break Outcome::Resolved(match resolved {
                        Ok(outcome) => outcome,
                        Err(_) => Err(Error::ConnectionClosed),
                    });
                }
                _ = tokio::time::sleep_until(deadline) => break Outcome::TimedOut,
                _ = poll.tick() => {
                    if cancellation.is_requested() {
                        break Outcome::Cancelled;
                    }
                }
            }
        };

        match outcome {
            Outcome::Resolved(result) => result,
            Outcome::TimedOut => {
                self.pending.remove(&self.id);
                Err(Error::Timeout {
                    ms: self.timeout.as_millis() as u64,
                })
            }
            Outcome::Cancelled => {
                self.abandon("caller cancelled").await;
                Err(Error::Cancelled)
            }
        }
    }

    /// Abandon the request locally and tell the peer.
    pub async fn abandon(self, reason: &str) {
        self.pending.remove(&self.id);
        let params = CancelledParams {
            request_id: self.id.clone(),
            reason: Some(reason.to_string()),
        };
        let notification = JsonRpcNotification::new(
            methods::NOTIF_CANCELLED,
            serde_json::to_value(params).ok(),
        );
        if self
            .outbound
            .send(Message::Notification(notification))
            .await
            .is_err()
        {
            warn!("Could not notify peer of abandoned request {}", self.id);
        }
    }
}
