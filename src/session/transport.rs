//! Transport layer.
//!
//! The engine core only sees channels of [`Message`]; this module supplies
//! the line-delimited stdio transport used by the binary.

use async_trait::async_trait;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::error::Result;
use crate::session::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// A message that can be sent or received.
#[derive(Debug, Clone)]
pub enum Message {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl Message {
    /// Parse one wire line into an envelope.
    ///
    /// Classification: a `method` with an `id` is a request, a `method`
    /// without an `id` is a notification, anything else with an `id` is a
    /// response.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let has_method = value.get("method").is_some();
        let has_id = value.get("id").is_some();

        let msg = match (has_method, has_id) {
            (true, true) => Self::Request(serde_json::from_value(value)?),
            (true, false) => Self::Notification(serde_json::from_value(value)?),
            (false, _) => Self::Response(serde_json::from_value(value)?),
        };
        Ok(msg)
    }

    /// Serialize the envelope to its wire form.
    pub fn to_json(&self) -> Result<String> {
        let json = match self {
            Self::Request(req) => serde_json::to_string(req)?,
            Self::Response(res) => serde_json::to_string(res)?,
            Self::Notification(notif) => serde_json::to_string(notif)?,
        };
        Ok(json)
    }
}

/// Transport trait for engine communication.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start the transport, returning channels for messages.
    async fn start(&mut self) -> Result<(mpsc::Receiver<Message>, mpsc::Sender<Message>)>;

    /// Stop the transport.
    async fn stop(&mut self) -> Result<()>;
}

/// Stdio transport: one envelope per line, stdout for writes.
pub struct StdioTransport {
    running: bool,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self { running: false }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&mut self) -> Result<(mpsc::Receiver<Message>, mpsc::Sender<Message>)> {
        self.running = true;

        // Channel for incoming messages (from stdin)
        let (incoming_tx, incoming_rx) = mpsc::channel::<Message>(100);
        // Channel for outgoing messages (to stdout)
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Message>(100);

        // Spawn stdin reader task
        let tx = incoming_tx.clone();
        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let mut reader = BufReader::new(stdin);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!("EOF on stdin, stopping transport");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }

                        trace!("Received: {}", trimmed);

                        match Message::parse(trimmed) {
                            Ok(msg) => {
                                if tx.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                // No id to answer with; drop and diagnose.
                                error!("Failed to parse message: {}", e);
                            }
                        }
                    }
                    Err(e) => {
                        error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        // Spawn stdout writer task
        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();

            while let Some(msg) = outgoing_rx.recv().await {
                match msg.to_json() {
                    Ok(s) => {
                        trace!("Sending: {}", s);
                        if let Err(e) = stdout.write_all(s.as_bytes()).await {
                            error!("Error writing to stdout: {}", e);
                            break;
                        }
                        if let Err(e) = stdout.write_all(b"\n").await {
                            error!("Error writing newline: {}", e);
                            break;
                        }
                        if let Err(e) = stdout.flush().await {
                            error!("Error flushing stdout: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error serializing message: {}", e);
                    }
                }
            }
        });

        Ok((incoming_rx, outgoing_tx))
    }

    async fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::protocol::RequestId;

    #[test]
    fn test_parse_request() {
        let msg = Message::parse(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        match msg {
            Message::Request(req) => {
                assert_eq!(req.method, "ping");
                assert_eq!(req.id, RequestId::Number(1));
            }
            _ => panic!("Expected request"),
        }
    }

    #[test]
    fn test_parse_notification() {
        let msg =
            Message::parse(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        match msg {
            Message::Notification(notif) => {
                assert_eq!(notif.method, "notifications/initialized");
            }
            _ => panic!("Expected notification"),
        }
    }

    #[test]
    fn test_parse_response() {
        let msg = Message::parse(r#"{"jsonrpc":"2.0","id":"abc","result":{"roots":[]}}"#).unwrap();
        match msg {
            Message::Response(res) => {
                assert_eq!(res.id, RequestId::String("abc".to_string()));
                assert!(res.result.is_some());
                assert!(res.error.is_none());
            }
            _ => panic!("Expected response"),
        }
    }

    #[test]
    fn test_parse_error_response() {
        let msg = Message::parse(
            r#"{"jsonrpc":"2.0","id":7,"error":{"code":-32601,"message":"nope"}}"#,
        )
        .unwrap();
        match msg {
            Message::Response(res) => {
                assert_eq!(res.error.unwrap().code, -32601);
            }
            _ => panic!("Expected response"),
        }
    }

    #[test]
    fn test_parse_garbage() {
        assert!(Message::parse("not json").is_err());
    }

    #[test]
    fn test_roundtrip() {
        let original = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        let msg = Message::parse(original).unwrap();
        let encoded = msg.to_json().unwrap();
        assert_eq!(encoded, original);
    }
}
