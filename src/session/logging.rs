//! Client-facing log notifications.
//!
//! Outbound `notifications/message` envelopes, filtered by the minimum
//! severity the client configured via `logging/setLevel`. Sending never
//! blocks and never fails the caller's own operation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::session::protocol::{methods, JsonRpcNotification};
use crate::session::transport::Message;

/// Log severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    /// Parse a wire-format level name.
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "notice" => Ok(Self::Notice),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            "alert" => Ok(Self::Alert),
            "emergency" => Ok(Self::Emergency),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        };
        write!(f, "{}", s)
    }
}

/// Params of a `logging/setLevel` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLevelParams {
    pub level: LogLevel,
}

/// Params of a `notifications/message` log notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessageParams {
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub data: Value,
}

/// Per-connection severity gate for outbound log notifications.
pub struct LogGate {
    level: RwLock<LogLevel>,
    outbound: mpsc::Sender<Message>,
    dropped: AtomicU64,
}

impl LogGate {
    pub fn new(outbound: mpsc::Sender<Message>, initial: LogLevel) -> Self {
        Self {
            level: RwLock::new(initial),
            outbound,
            dropped: AtomicU64::new(0),
        }
    }

    /// Current minimum severity.
    pub fn level(&self) -> LogLevel {
        *self.level.read().unwrap()
    }

    /// Update the minimum severity (from `logging/setLevel`).
    pub fn set_level(&self, level: LogLevel) {
        *self.level.write().unwrap() = level;
    }

    /// Whether a message at `level` passes the gate.
    pub fn should_send(&self, level: LogLevel) -> bool {
        level >= self.level()
    }

    /// Emit a log notification if the gate allows it.
    ///
    /// Uses a non-blocking send; a full channel drops the message and is
    /// diagnosed separately, the caller never sees a failure.
    pub fn send(&self, level: LogLevel, logger: Option<&str>, data: Value) {
        if !self.should_send(level) {
            return;
        }

        let params = LogMessageParams {
            level,
            logger: logger.map(String::from),
            data,
        };
        let notification =
            JsonRpcNotification::new(methods::NOTIF_MESSAGE, serde_json::to_value(params).ok());
        if self
            .outbound
            .try_send(Message::Notification(notification))
            .is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Log notification dropped (outbound channel unavailable)");
        }
    }

    /// Log notifications dropped because the channel was unavailable.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Handler-facing logger bound to one method's logger name.
#[derive(Clone)]
pub struct McpLog {
    gate: Arc<LogGate>,
    logger: String,
}

impl McpLog {
    pub fn new(gate: Arc<LogGate>, logger: impl Into<String>) -> Self {
        Self {
            gate,
            logger: logger.into(),
        }
    }

    /// Current minimum severity for the connection.
    pub fn level(&self) -> LogLevel {
        self.gate.level()
    }

    /// Send arbitrary structured data at the given level.
    pub fn send(&self, level: LogLevel, data: Value) {
        self.gate.send(level, Some(&self.logger), data);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.send(LogLevel::Debug, Value::String(message.into()));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.send(LogLevel::Info, Value::String(message.into()));
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.send(LogLevel::Warning, Value::String(message.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(LogLevel::Error, Value::String(message.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gate(capacity: usize, level: LogLevel) -> (Arc<LogGate>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Arc::new(LogGate::new(tx, level)), rx)
    }

    #[test]
    fn test_severity_total_order() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Notice);
        assert!(LogLevel::Notice < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Critical);
        assert!(LogLevel::Critical < LogLevel::Alert);
        assert!(LogLevel::Alert < LogLevel::Emergency);
    }

    #[test]
    fn test_level_wire_format() {
        assert_eq!(serde_json::to_string(&LogLevel::Warning).unwrap(), "\"warning\"");
        let parsed: LogLevel = serde_json::from_str("\"emergency\"").unwrap();
        assert_eq!(parsed, LogLevel::Emergency);

        assert_eq!(LogLevel::parse("notice").unwrap(), LogLevel::Notice);
        assert!(LogLevel::parse("loud").is_err());
    }

    #[tokio::test]
    async fn test_gate_filters_below_minimum() {
        let (gate, mut rx) = gate(8, LogLevel::Warning);

        assert!(!gate.should_send(LogLevel::Info));
        assert!(gate.should_send(LogLevel::Warning));
        assert!(gate.should_send(LogLevel::Error));

        gate.send(LogLevel::Info, None, json!("quiet"));
        gate.send(LogLevel::Error, Some("test"), json!("loud"));

        match rx.try_recv().unwrap() {
            Message::Notification(notif) => {
                assert_eq!(notif.method, methods::NOTIF_MESSAGE);
                let params: LogMessageParams =
                    serde_json::from_value(notif.params.unwrap()).unwrap();
                assert_eq!(params.level, LogLevel::Error);
                assert_eq!(params.logger, Some("test".to_string()));
            }
            _ => panic!("Expected notification"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_set_level_applies_immediately() {
        let (gate, mut rx) = gate(8, LogLevel::Emergency);

        gate.send(LogLevel::Error, None, json!("suppressed"));
        gate.set_level(LogLevel::Debug);
        gate.send(LogLevel::Debug, None, json!("visible"));

        assert!(matches!(rx.try_recv().unwrap(), Message::Notification(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_never_blocks_on_full_channel() {
        let (gate, _rx) = gate(1, LogLevel::Debug);

        gate.send(LogLevel::Info, None, json!(1));
        // Channel full: dropped, not blocked, no error.
        gate.send(LogLevel::Info, None, json!(2));
        gate.send(LogLevel::Info, None, json!(3));

        assert_eq!(gate.dropped(), 2);
    }

    #[tokio::test]
    async fn test_mcp_log_carries_logger_name() {
        let (gate, mut rx) = gate(8, LogLevel::Debug);
        let log = McpLog::new(gate, "demo/echo");

        log.info("starting");

        match rx.try_recv().unwrap() {
            Message::Notification(notif) => {
                let params: LogMessageParams =
                    serde_json::from_value(notif.params.unwrap()).unwrap();
                assert_eq!(params.logger, Some("demo/echo".to_string()));
                assert_eq!(params.data, json!("starting"));
            }
            _ => panic!("Expected notification"),
        }
    }
}
