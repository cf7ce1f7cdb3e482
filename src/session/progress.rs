//! Progress notifications.
//!
//! Per-request progress state, gated by the progress token the client
//! supplied in `params._meta`. A request without a token gets a disabled
//! sentinel whose operations are silent no-ops, so handler code never
//! branches on token presence.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::error::{Error, Result};
use crate::session::protocol::{methods, JsonRpcNotification};
use crate::session::transport::Message;

/// Progress token for tracking operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Number(i64),
}

impl ProgressToken {
    /// Extract the token a request carried in `params._meta.progressToken`.
    pub fn from_request_params(params: &Option<Value>) -> Option<Self> {
        params
            .as_ref()?
            .get("_meta")?
            .get("progressToken")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }
}

/// Progress notification params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    pub progress_token: ProgressToken,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

struct ProgressCell {
    current: f64,
    closed: bool,
}

struct ProgressInner {
    token: ProgressToken,
    total: Option<f64>,
    step: f64,
    outbound: mpsc::Sender<Message>,
    cell: Mutex<ProgressCell>,
}

/// Progress state for one request.
///
/// Advances are serialized through an internal lock; each successful
/// advance emits exactly one `notifications/progress` carrying the
/// cumulative value. An advance that would push past a declared total is
/// rejected outright, never clamped.
#[derive(Clone)]
pub struct Progress {
    inner: Option<Arc<ProgressInner>>,
}

impl Progress {
    /// Open progress state for a request.
    ///
    /// Without a token this returns the disabled sentinel.
    pub fn open(
        token: Option<ProgressToken>,
        total: Option<f64>,
        outbound: mpsc::Sender<Message>,
    ) -> Self {
        Self::open_with_step(token, total, 1.0, outbound)
    }

    /// Open progress state with a custom default step.
    pub fn open_with_step(
        token: Option<ProgressToken>,
        total: Option<f64>,
        step: f64,
        outbound: mpsc::Sender<Message>,
    ) -> Self {
        let inner = token.map(|token| {
            Arc::new(ProgressInner {
                token,
                total,
                step,
                outbound,
                cell: Mutex::new(ProgressCell {
                    current: 0.0,
                    closed: false,
                }),
            })
        });
        Self { inner }
    }

    /// The disabled sentinel: every operation is a silent no-op.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Whether notifications will actually be sent.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// The request's progress token, if one was supplied.
    pub fn token(&self) -> Option<&ProgressToken> {
        self.inner.as_deref().map(|i| &i.token)
    }

    /// Cumulative progress so far (0 for the sentinel).
    pub async fn current(&self) -> f64 {
        match &self.inner {
            Some(inner) => inner.cell.lock().await.current,
            None => 0.0,
        }
    }

    /// Advance by `delta` and notify the client.
    ///
    /// Rejects with `OutOfRange` if the cumulative value would exceed the
    /// declared total; the state afterwards still reflects only the
    /// advances accepted before the rejection.
    pub async fn advance(&self, delta: f64, message: Option<&str>) -> Result<()> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };

        // Lock held across the send so notification order matches the
        // cumulative values they carry.
        let mut cell = inner.cell.lock().await;
        if cell.closed {
            return Err(Error::ProgressClosed);
        }
        if let Some(total) = inner.total {
            if cell.current + delta > total {
                return Err(Error::OutOfRange {
                    current: cell.current,
                    delta,
                    total,
                });
            }
        }
        cell.current += delta;

        let params = ProgressParams {
            progress_token: inner.token.clone(),
            progress: cell.current,
            total: inner.total,
            message: message.map(String::from),
        };
        let notification =
            JsonRpcNotification::new(methods::NOTIF_PROGRESS, serde_json::to_value(params).ok());
        let _ = inner
            .outbound
            .send(Message::Notification(notification))
            .await;
        Ok(())
    }

    /// Advance by the configured default step.
    pub async fn advance_step(&self, message: Option<&str>) -> Result<()> {
        let step = match &self.inner {
            Some(inner) => inner.step,
            None => return Ok(()),
        };
        self.advance(step, message).await
    }

    /// Release the state; later advances are rejected.
    pub async fn close(&self) {
        if let Some(inner) = &self.inner {
            inner.cell.lock().await.closed = true;
        }
    }
}
