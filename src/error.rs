//! Error types for the session engine.

use thiserror::Error;

use crate::session::protocol::{error_codes, JsonRpcError};

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the session engine.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Lifecycle Errors =====
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("connection closed")]
    ConnectionClosed,

    // ===== Request Errors =====
    #[error("timeout: no response within {ms} ms")]
    Timeout { ms: u64 },

    #[error("cancelled: operation was cancelled")]
    Cancelled,

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("peer returned error: {0}")]
    Rpc(JsonRpcError),

    // ===== Progress Errors =====
    #[error("progress out of range: {current} + {delta} exceeds total {total}")]
    OutOfRange {
        current: f64,
        delta: f64,
        total: f64,
    },

    #[error("progress state already closed")]
    ProgressClosed,

    // ===== Client Feature Errors =====
    #[error("client does not support capability: {0}")]
    Unsupported(&'static str),

    // ===== I/O Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== Internal Errors =====
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// JSON-RPC error code for this error when surfaced as a response.
    pub fn code(&self) -> i32 {
        match self {
            Self::ProtocolViolation(_) | Self::ConnectionClosed => error_codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => error_codes::INVALID_PARAMS,
            Self::Json(_) => error_codes::PARSE_ERROR,
            Self::Rpc(e) => e.code,
            _ => error_codes::INTERNAL_ERROR,
        }
    }

    /// Convert into a JSON-RPC error object.
    pub fn to_json_rpc(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.code(),
            message: self.to_string(),
            data: None,
        }
    }

    /// Errors that must not produce a response envelope at all.
    ///
    /// A cancelled request sends nothing back: the client already knows it
    /// cancelled.
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let violation = Error::ProtocolViolation("initialize called twice".to_string());
        assert_eq!(
            violation.to_string(),
            "protocol violation: initialize called twice"
        );

        let timeout = Error::Timeout { ms: 50 };
        assert_eq!(timeout.to_string(), "timeout: no response within 50 ms");

        let closed = Error::ConnectionClosed;
        assert_eq!(closed.to_string(), "connection closed");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::ProtocolViolation("x".to_string()).code(),
            error_codes::INVALID_REQUEST
        );
        assert_eq!(
            Error::MethodNotFound("tools/call".to_string()).code(),
            error_codes::METHOD_NOT_FOUND
        );
        assert_eq!(
            Error::InvalidParams("missing field".to_string()).code(),
            error_codes::INVALID_PARAMS
        );
        assert_eq!(Error::Timeout { ms: 10 }.code(), error_codes::INTERNAL_ERROR);
    }

    #[test]
    fn test_rpc_error_code_passthrough() {
        let err = Error::Rpc(JsonRpcError {
            code: -32001,
            message: "custom".to_string(),
            data: None,
        });
        assert_eq!(err.code(), -32001);
    }

    #[test]
    fn test_out_of_range_display() {
        let err = Error::OutOfRange {
            current: 7.0,
            delta: 5.0,
            total: 10.0,
        };
        assert!(err.to_string().contains("exceeds total 10"));
    }

    #[test]
    fn test_silent_errors() {
        assert!(Error::Cancelled.is_silent());
        assert!(!Error::ConnectionClosed.is_silent());
        assert!(!Error::Timeout { ms: 1 }.is_silent());
    }

    #[test]
    fn test_to_json_rpc() {
        let err = Error::MethodNotFound("nope".to_string());
        let rpc = err.to_json_rpc();
        assert_eq!(rpc.code, error_codes::METHOD_NOT_FOUND);
        assert!(rpc.message.contains("nope"));
        assert!(rpc.data.is_none());
    }
}
