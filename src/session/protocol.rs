//! Protocol types and message definitions.
//!
//! JSON-RPC 2.0 envelopes plus the lifecycle types exchanged during the
//! initialize handshake.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC version.
pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol version this engine speaks by default.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol versions the engine accepts from clients.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Pick the protocol version to answer with.
///
/// A known client version is echoed back; anything else gets the engine's
/// own latest version.
pub fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|v| **v == requested)
        .copied()
        .unwrap_or(PROTOCOL_VERSION)
}

// ===== JSON-RPC Base Types =====

/// A JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Build a success response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A JSON-RPC notification (no id, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Request ID (can be string or number).
///
/// Unique per direction of one connection while the request is outstanding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Number(n) => write!(f, "{}", n),
        }
    }
}

// ===== Wire Methods =====

/// Method names the engine recognizes or emits.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const PING: &str = "ping";
    pub const SET_LOG_LEVEL: &str = "logging/setLevel";
    pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
    pub const ELICITATION_CREATE: &str = "elicitation/create";
    pub const ROOTS_LIST: &str = "roots/list";
    pub const NOTIF_INITIALIZED: &str = "notifications/initialized";
    pub const NOTIF_CANCELLED: &str = "notifications/cancelled";
    pub const NOTIF_PROGRESS: &str = "notifications/progress";
    pub const NOTIF_MESSAGE: &str = "notifications/message";
    pub const NOTIF_ROOTS_CHANGED: &str = "notifications/roots/listChanged";
}

// ===== Capabilities =====

/// Serde helpers for presence-only capability markers.
///
/// On the wire these are empty objects; in memory they are plain booleans.
pub(crate) mod cap_flag {
    use serde::de::IgnoredAny;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<IgnoredAny>::deserialize(deserializer)?.is_some())
    }

    pub fn serialize<S>(_supported: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Only reached when the flag is true; emits the `{}` marker.
        serializer.serialize_map(Some(0))?.end()
    }

    pub fn is_false(flag: &bool) -> bool {
        !*flag
    }
}

/// Capabilities advertised by the client in `initialize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    #[serde(
        default,
        deserialize_with = "cap_flag::deserialize",
        serialize_with = "cap_flag::serialize",
        skip_serializing_if = "cap_flag::is_false"
    )]
    pub sampling: bool,
    #[serde(
        default,
        deserialize_with = "cap_flag::deserialize",
        serialize_with = "cap_flag::serialize",
        skip_serializing_if = "cap_flag::is_false"
    )]
    pub elicitation: bool,
}

/// Roots capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapability {
    #[serde(default)]
    pub list_changed: bool,
}

/// Capabilities the server advertises back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(
        default,
        deserialize_with = "cap_flag::deserialize",
        serialize_with = "cap_flag::serialize",
        skip_serializing_if = "cap_flag::is_false"
    )]
    pub tools: bool,
    #[serde(
        default,
        deserialize_with = "cap_flag::deserialize",
        serialize_with = "cap_flag::serialize",
        skip_serializing_if = "cap_flag::is_false"
    )]
    pub prompts: bool,
    #[serde(
        default,
        deserialize_with = "cap_flag::deserialize",
        serialize_with = "cap_flag::serialize",
        skip_serializing_if = "cap_flag::is_false"
    )]
    pub resources: bool,
    #[serde(
        default,
        deserialize_with = "cap_flag::deserialize",
        serialize_with = "cap_flag::serialize",
        skip_serializing_if = "cap_flag::is_false"
    )]
    pub logging: bool,
}

// ===== Lifecycle Types =====

/// Server identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Client identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// Initialize request params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

/// Initialize result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
}

// ===== Error Codes =====

/// Standard JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}
