//! Server-initiated requests to the client.
//!
//! Thin facades over the request correlator for the three client
//! capabilities a handler may call back into mid-request: LLM sampling,
//! user elicitation, and roots listing. Each facade offers the same pair:
//! a `request_*` variant returning the raw [`ResponseFuture`], and an
//! awaiting variant that also watches the calling handler's own
//! cancellation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::session::cancellation::Cancellation;
use crate::session::correlator::{RequestCorrelator, ResponseFuture};
use crate::session::protocol::methods;

// ===== Sampling Types =====

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Content block in a sampling message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    #[serde(rename_all = "camelCase")]
    Text { text: String },
    #[serde(rename_all = "camelCase")]
    Image { data: String, mime_type: String },
}

/// One message in a sampling conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingMessage {
    pub role: Role,
    pub content: ContentBlock,
}

impl SamplingMessage {
    /// Convenience for a user-role text message.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: ContentBlock::Text { text: text.into() },
        }
    }
}

/// Params for `sampling/createMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageParams {
    pub messages: Vec<SamplingMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
}

/// Result of `sampling/createMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResult {
    pub role: Role,
    pub content: ContentBlock,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

// ===== Elicitation Types =====

/// Params for `elicitation/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElicitationParams {
    pub message: String,
    pub requested_schema: Value,
}

/// What the user did with the elicitation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitationAction {
    Accept,
    Decline,
    Cancel,
}

/// Result of `elicitation/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitationResult {
    pub action: ElicitationAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl ElicitationResult {
    pub fn accepted(&self) -> bool {
        self.action == ElicitationAction::Accept
    }
}

// ===== Roots Types =====

/// A root the client operates under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Result of `roots/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRootsResult {
    pub roots: Vec<Root>,
}

// ===== Facades =====

/// LLM sampling through the connected client.
#[derive(Clone)]
pub struct Sampling {
    correlator: Arc<RequestCorrelator>,
    cancellation: Cancellation,
    supported: bool,
}

impl Sampling {
    pub fn new(
        correlator: Arc<RequestCorrelator>,
        cancellation: Cancellation,
        supported: bool,
    ) -> Self {
        Self {
            correlator,
            cancellation,
            supported,
        }
    }

    /// Whether the client negotiated the sampling capability.
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Send `sampling/createMessage` without waiting for the result.
    pub async fn request_create_message(
        &self,
        params: &CreateMessageParams,
    ) -> Result<ResponseFuture> {
        if !self.supported {
            return Err(Error::Unsupported("sampling"));
        }
        let (_, future) = self
            .correlator
            .begin(
                methods::SAMPLING_CREATE_MESSAGE,
                Some(serde_json::to_value(params)?),
            )
            .await?;
        Ok(future)
    }

    /// Send `sampling/createMessage` and wait for the client's answer.
    pub async fn create_message(&self, params: &CreateMessageParams) -> Result<CreateMessageResult> {
        let future = self.request_create_message(params).await?;
        let value = future.await_or_cancel(&self.cancellation).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// User-input elicitation through the connected client.
#[derive(Clone)]
pub struct Elicitation {
    correlator: Arc<RequestCorrelator>,
    cancellation: Cancellation,
    supported: bool,
}

impl Elicitation {
    pub fn new(
        correlator: Arc<RequestCorrelator>,
        cancellation: Cancellation,
        supported: bool,
    ) -> Self {
        Self {
            correlator,
            cancellation,
            supported,
        }
    }

    /// Whether the client negotiated the elicitation capability.
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Send `elicitation/create` without waiting for the result.
    pub async fn request_elicit(&self, params: &ElicitationParams) -> Result<ResponseFuture> {
        if !self.supported {
            return Err(Error::Unsupported("elicitation"));
        }
        let (_, future) = self
            .correlator
            .begin(
                methods::ELICITATION_CREATE,
                Some(serde_json::to_value(params)?),
            )
            .await?;
        Ok(future)
    }

    /// Send `elicitation/create` and wait for the user's answer.
    pub async fn elicit(&self, params: &ElicitationParams) -> Result<ElicitationResult> {
        let future = self.request_elicit(params).await?;
        let value = future.await_or_cancel(&self.cancellation).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Roots listing through the connected client.
#[derive(Clone)]
pub struct Roots {
    correlator: Arc<RequestCorrelator>,
    cancellation: Cancellation,
    supported: bool,
}

impl Roots {
    pub fn new(
        correlator: Arc<RequestCorrelator>,
        cancellation: Cancellation,
        supported: bool,
    ) -> Self {
        Self {
            correlator,
            cancellation,
            supported,
        }
    }

    /// Whether the client negotiated the roots capability.
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    /// Send `roots/list` without waiting for the result.
    pub async fn request_list(&self) -> Result<ResponseFuture> {
        if !self.supported {
            return Err(Error::Unsupported("roots"));
        }
        let (_, future) = self.correlator.begin(methods::ROOTS_LIST, None).await?;
        Ok(future)
    }

    /// Send `roots/list` and wait for the client's roots.
    pub async fn list(&self) -> Result<Vec<Root>> {
        let future = self.request_list().await?;
        let value = future.await_or_cancel(&self.cancellation).await?;
        let result: ListRootsResult = serde_json::from_value(value)?;
        Ok(result.roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::cancellation::CancellationTracker;
    use crate::session::protocol::{JsonRpcResponse, RequestId};
    use crate::session::transport::Message;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn setup() -> (
        Arc<RequestCorrelator>,
        Cancellation,
        mpsc::Receiver<Message>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        let correlator = Arc::new(RequestCorrelator::new(
            tx,
            CancellationToken::new(),
            Duration::from_secs(5),
        ));
        let cancellation = CancellationTracker::new().handle(RequestId::Number(1));
        (correlator, cancellation, rx)
    }

    #[tokio::test]
    async fn test_unsupported_capability_rejected() {
        let (correlator, cancellation, _rx) = setup();

        let sampling = Sampling::new(correlator.clone(), cancellation.clone(), false);
        let err = sampling
            .create_message(&CreateMessageParams {
                messages: vec![SamplingMessage::user_text("hi")],
                system_prompt: None,
                max_tokens: 10,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported("sampling")));

        let roots = Roots::new(correlator, cancellation, false);
        assert!(matches!(
            roots.list().await.unwrap_err(),
            Error::Unsupported("roots")
        ));
    }

    #[tokio::test]
    async fn test_roots_list_roundtrip() {
        let (correlator, cancellation, mut rx) = setup();
        let roots = Roots::new(correlator.clone(), cancellation, true);

        let responder = tokio::spawn({
            let correlator = correlator.clone();
            async move {
                match rx.recv().await.unwrap() {
                    Message::Request(req) => {
                        assert_eq!(req.method, methods::ROOTS_LIST);
                        correlator.resolve_response(JsonRpcResponse::success(
                            req.id,
                            json!({"roots": [{"uri": "file:///workspace", "name": "ws"}]}),
                        ));
                    }
                    _ => panic!("Expected request"),
                }
            }
        });

        let listed = roots.list().await.unwrap();
        responder.await.unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].uri, "file:///workspace");
        assert_eq!(listed[0].name.as_deref(), Some("ws"));
    }

    #[tokio::test]
    async fn test_sampling_roundtrip() {
        let (correlator, cancellation, mut rx) = setup();
        let sampling = Sampling::new(correlator.clone(), cancellation, true);

        let responder = tokio::spawn({
            let correlator = correlator.clone();
            async move {
                match rx.recv().await.unwrap() {
                    Message::Request(req) => {
                        let params = req.params.unwrap();
                        assert_eq!(params["maxTokens"], 64);
                        correlator.resolve_response(JsonRpcResponse::success(
                            req.id,
                            json!({
                                "role": "assistant",
                                "content": {"type": "text", "text": "hello back"},
                                "model": "test-model",
                                "stopReason": "endTurn"
                            }),
                        ));
                    }
                    _ => panic!("Expected request"),
                }
            }
        });

        let result = sampling
            .create_message(&CreateMessageParams {
                messages: vec![SamplingMessage::user_text("hello")],
                system_prompt: Some("be brief".to_string()),
                max_tokens: 64,
            })
            .await
            .unwrap();
        responder.await.unwrap();

        assert_eq!(result.model, "test-model");
        assert!(matches!(result.content, ContentBlock::Text { ref text } if text == "hello back"));
    }

    #[tokio::test]
    async fn test_elicitation_decline() {
        let (correlator, cancellation, mut rx) = setup();
        let elicitation = Elicitation::new(correlator.clone(), cancellation, true);

        let responder = tokio::spawn({
            let correlator = correlator.clone();
            async move {
                match rx.recv().await.unwrap() {
                    Message::Request(req) => {
                        correlator.resolve_response(JsonRpcResponse::success(
                            req.id,
                            json!({"action": "decline"}),
                        ));
                    }
                    _ => panic!("Expected request"),
                }
            }
        });

        let result = elicitation
            .elicit(&ElicitationParams {
                message: "email?".to_string(),
                requested_schema: json!({"type": "object"}),
            })
            .await
            .unwrap();
        responder.await.unwrap();

        assert!(!result.accepted());
        assert!(result.content.is_none());
    }

    #[test]
    fn test_content_block_wire_format() {
        let text = ContentBlock::Text {
            text: "Hello".to_string(),
        };
        let image = ContentBlock::Image {
            data: "base64data".to_string(),
            mime_type: "image/png".to_string(),
        };

        let text_json = serde_json::to_string(&text).unwrap();
        assert!(text_json.contains("\"type\":\"text\""));

        let image_json = serde_json::to_string(&image).unwrap();
        assert!(image_json.contains("\"type\":\"image\""));
        assert!(image_json.contains("\"mimeType\""));
    }
}
