//! Cancellation tracking.
//!
//! Records `notifications/cancelled` signals from the peer and exposes a
//! cheap poll to running handlers. Cancellation is cooperative: nothing
//! preempts handler code, it has to check.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::session::protocol::RequestId;

/// Params of a `notifications/cancelled` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledParams {
    pub request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
struct CancellationRecord {
    reason: Option<String>,
    received_at: Instant,
}

/// Per-connection table of cancellation signals, keyed by target id.
///
/// Records may arrive before the matching handler ever runs, or for
/// requests that already finished; stale entries are purged after a grace
/// window so the table stays bounded.
#[derive(Clone)]
pub struct CancellationTracker {
    records: Arc<DashMap<RequestId, CancellationRecord>>,
}

impl CancellationTracker {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }

    /// Record a cancellation signal. Idempotent; a repeat overwrites the
    /// reason.
    pub fn mark_cancelled(&self, id: RequestId, reason: Option<String>) {
        self.records.insert(
            id,
            CancellationRecord {
                reason,
                received_at: Instant::now(),
            },
        );
    }

    /// Cheap poll, safe to call from any handler checkpoint.
    pub fn is_cancelled(&self, id: &RequestId) -> bool {
        self.records.contains_key(id)
    }

    /// Reason supplied by the peer, if any.
    pub fn reason(&self, id: &RequestId) -> Option<String> {
        self.records.get(id).and_then(|r| r.reason.clone())
    }

    /// Drop the record for a finished handler.
    pub fn clear(&self, id: &RequestId) {
        self.records.remove(id);
    }

    /// Purge records older than `grace` with no in-flight handler.
    ///
    /// Returns the number of records removed.
    pub fn purge_stale(&self, grace: Duration, in_flight: impl Fn(&RequestId) -> bool) -> usize {
        let stale: Vec<RequestId> = self
            .records
            .iter()
            .filter(|entry| entry.value().received_at.elapsed() >= grace && !in_flight(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        let count = stale.len();
        for id in stale {
            self.records.remove(&id);
        }
        count
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Build the poll handle injected into the handler for `id`.
    pub fn handle(&self, id: RequestId) -> Cancellation {
        Cancellation {
            tracker: self.clone(),
            id,
        }
    }
}

impl Default for CancellationTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler-facing cancellation check, bound to one request id.
#[derive(Clone)]
pub struct Cancellation {
    tracker: CancellationTracker,
    id: RequestId,
}

impl Cancellation {
    /// Whether the peer asked to cancel this request.
    pub fn is_requested(&self) -> bool {
        self.tracker.is_cancelled(&self.id)
    }

    /// Cancellation reason, if one was given.
    pub fn reason(&self) -> Option<String> {
        self.tracker.reason(&self.id)
    }

    /// Bail out of the handler if cancellation was requested.
    ///
    /// Meant for safe checkpoints: loop iterations, before expensive
    /// sub-steps.
    pub fn skip_if_cancelled(&self) -> Result<()> {
        if self.is_requested() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: i64) -> RequestId {
        RequestId::Number(n)
    }

    #[test]
    fn test_mark_and_poll() {
        let tracker = CancellationTracker::new();

        // No false positives before the mark.
        assert!(!tracker.is_cancelled(&id(1)));

        tracker.mark_cancelled(id(1), Some("user abort".to_string()));
        // No false negatives after it.
        assert!(tracker.is_cancelled(&id(1)));
        assert_eq!(tracker.reason(&id(1)), Some("user abort".to_string()));
        assert!(!tracker.is_cancelled(&id(2)));
    }

    #[test]
    fn test_mark_is_idempotent() {
        let tracker = CancellationTracker::new();
        tracker.mark_cancelled(id(1), None);
        tracker.mark_cancelled(id(1), Some("second".to_string()));

        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.reason(&id(1)), Some("second".to_string()));
    }

    #[test]
    fn test_clear() {
        let tracker = CancellationTracker::new();
        tracker.mark_cancelled(id(1), None);
        tracker.clear(&id(1));
        assert!(!tracker.is_cancelled(&id(1)));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_purge_spares_in_flight_handlers() {
        let tracker = CancellationTracker::new();
        tracker.mark_cancelled(id(1), None);
        tracker.mark_cancelled(id(2), None);

        let removed = tracker.purge_stale(Duration::ZERO, |target| *target == id(1));
        assert_eq!(removed, 1);
        assert!(tracker.is_cancelled(&id(1)));
        assert!(!tracker.is_cancelled(&id(2)));
    }

    #[test]
    fn test_purge_respects_grace_window() {
        let tracker = CancellationTracker::new();
        tracker.mark_cancelled(id(1), None);

        // Record is fresh; an hour-long grace keeps it.
        let removed = tracker.purge_stale(Duration::from_secs(3600), |_| false);
        assert_eq!(removed, 0);
        assert!(tracker.is_cancelled(&id(1)));
    }

    #[test]
    fn test_handle_skip_if_cancelled() {
        let tracker = CancellationTracker::new();
        let handle = tracker.handle(id(7));

        handle.skip_if_cancelled().unwrap();

        tracker.mark_cancelled(id(7), Some("deadline passed".to_string()));
        assert!(handle.is_requested());
        assert_eq!(handle.reason(), Some("deadline passed".to_string()));
        assert!(matches!(
            handle.skip_if_cancelled().unwrap_err(),
            Error::Cancelled
        ));
    }

    #[test]
    fn test_cancelled_params_wire_format() {
        let params = CancelledParams {
            request_id: RequestId::String("abc".to_string()),
            reason: None,
        };
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"requestId\":\"abc\""));
        assert!(!json.contains("reason"));

        let parsed: CancelledParams =
            serde_json::from_str(r#"{"requestId":42,"reason":"slow"}"#).unwrap();
        assert_eq!(parsed.request_id, RequestId::Number(42));
        assert_eq!(parsed.reason, Some("slow".to_string()));
    }
}
