//! Per-connection lifecycle state machine.
//!
//! NEW -> INITIALIZING -> IN_OPERATION -> CLOSED, with CLOSED reachable
//! from every state. Status only ever advances.

use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::session::protocol::{
    methods, negotiate_version, ClientCapabilities, InitializeParams, InitializeResult,
    ServerCapabilities, ServerInfo,
};

/// The status of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Waiting for the `initialize` request from the client.
    New,
    /// Capabilities sent, waiting for the `initialized` notification.
    Initializing,
    /// Handshake complete, normal operation.
    InOperation,
    /// Terminal.
    Closed,
}

impl Status {
    /// Whether the client has completed initialization.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::InOperation)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::Initializing => "INITIALIZING",
            Self::InOperation => "IN_OPERATION",
            Self::Closed => "CLOSED",
        };
        write!(f, "{}", s)
    }
}

struct StateInner {
    status: Status,
    init_request: Option<InitializeParams>,
    negotiated_version: Option<&'static str>,
}

/// Session state machine for one connection.
pub struct SessionState {
    server_info: ServerInfo,
    capabilities: ServerCapabilities,
    inner: RwLock<StateInner>,
}

impl SessionState {
    pub fn new(server_info: ServerInfo, capabilities: ServerCapabilities) -> Self {
        Self {
            server_info,
            capabilities,
            inner: RwLock::new(StateInner {
                status: Status::New,
                init_request: None,
                negotiated_version: None,
            }),
        }
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.inner.read().unwrap().status
    }

    /// The initialize request recorded during the handshake, if any.
    pub fn init_request(&self) -> Option<InitializeParams> {
        self.inner.read().unwrap().init_request.clone()
    }

    /// Protocol version agreed during initialize.
    pub fn negotiated_version(&self) -> Option<&'static str> {
        self.inner.read().unwrap().negotiated_version
    }

    /// Capabilities the client negotiated, empty before initialize.
    pub fn client_capabilities(&self) -> ClientCapabilities {
        self.inner
            .read()
            .unwrap()
            .init_request
            .as_ref()
            .map(|r| r.capabilities.clone())
            .unwrap_or_default()
    }

    /// Handle the `initialize` request. Valid only in NEW.
    pub fn on_initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let mut inner = self.inner.write().unwrap();
        match inner.status {
            Status::New => {}
            Status::Closed => return Err(Error::ConnectionClosed),
            other => {
                return Err(Error::ProtocolViolation(format!(
                    "initialize received in state {}",
                    other
                )))
            }
        }

        let version = negotiate_version(&params.protocol_version);
        inner.negotiated_version = Some(version);
        inner.init_request = Some(params);
        inner.status = Status::Initializing;

        Ok(InitializeResult {
            protocol_version: version.to_string(),
            capabilities: self.capabilities.clone(),
            server_info: self.server_info.clone(),
        })
    }

    /// Handle the `initialized` notification. Valid only in INITIALIZING.
    ///
    /// The caller logs and ignores the violation: a notification has no
    /// response channel to carry the error.
    pub fn on_initialized(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.status {
            Status::Initializing => {
                inner.status = Status::InOperation;
                Ok(())
            }
            Status::Closed => Err(Error::ConnectionClosed),
            other => Err(Error::ProtocolViolation(format!(
                "initialized notification received in state {}",
                other
            ))),
        }
    }

    /// Transition to CLOSED. Returns false if already closed.
    pub fn on_close(&self) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.status == Status::Closed {
            return false;
        }
        inner.status = Status::Closed;
        true
    }

    /// Check that a request method may be handled in the current state.
    ///
    /// Requests arriving before the handshake completes are rejected, not
    /// queued. `initialize` itself is the only method allowed in NEW.
    pub fn ensure_ready(&self, method: &str) -> Result<()> {
        let status = self.status();
        match status {
            Status::InOperation => Ok(()),
            Status::Closed => Err(Error::ConnectionClosed),
            Status::New if method == methods::INITIALIZE => Ok(()),
            _ => Err(Error::ProtocolViolation(format!(
                "method {} not allowed in state {}",
                method, status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::protocol::{ClientInfo, PROTOCOL_VERSION};

    fn init_params() -> InitializeParams {
        InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo {
                name: "test-client".to_string(),
                version: "1.0.0".to_string(),
            },
        }
    }

    fn state() -> SessionState {
        SessionState::new(
            ServerInfo {
                name: "test-engine".to_string(),
                version: "0.0.1".to_string(),
            },
            ServerCapabilities {
                logging: true,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_handshake_transitions() {
        let state = state();
        assert_eq!(state.status(), Status::New);

        let result = state.on_initialize(init_params()).unwrap();
        assert_eq!(state.status(), Status::Initializing);
        assert_eq!(result.protocol_version, PROTOCOL_VERSION);
        assert_eq!(state.negotiated_version(), Some(PROTOCOL_VERSION));
        assert!(result.capabilities.logging);

        state.on_initialized().unwrap();
        assert_eq!(state.status(), Status::InOperation);
        assert!(state.status().is_ready());
    }

    #[test]
    fn test_double_initialize_rejected() {
        let state = state();
        state.on_initialize(init_params()).unwrap();

        let err = state.on_initialize(init_params()).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
        // First handshake is untouched.
        assert_eq!(state.status(), Status::Initializing);
    }

    #[test]
    fn test_initialized_requires_initializing() {
        let state = state();
        assert!(matches!(
            state.on_initialized().unwrap_err(),
            Error::ProtocolViolation(_)
        ));
        assert_eq!(state.status(), Status::New);
    }

    #[test]
    fn test_ensure_ready_gates_operations() {
        let state = state();

        // NEW: only initialize.
        state.ensure_ready(methods::INITIALIZE).unwrap();
        assert!(matches!(
            state.ensure_ready("tools/call").unwrap_err(),
            Error::ProtocolViolation(_)
        ));

        // INITIALIZING: nothing, including a second initialize.
        state.on_initialize(init_params()).unwrap();
        assert!(state.ensure_ready(methods::INITIALIZE).is_err());
        assert!(state.ensure_ready(methods::PING).is_err());

        // IN_OPERATION: everything.
        state.on_initialized().unwrap();
        state.ensure_ready("tools/call").unwrap();
        state.ensure_ready(methods::PING).unwrap();
    }

    #[test]
    fn test_close_is_terminal() {
        let state = state();
        assert!(state.on_close());
        assert!(!state.on_close());
        assert_eq!(state.status(), Status::Closed);

        assert!(matches!(
            state.ensure_ready(methods::INITIALIZE).unwrap_err(),
            Error::ConnectionClosed
        ));
        assert!(matches!(
            state.on_initialize(init_params()).unwrap_err(),
            Error::ConnectionClosed
        ));
        assert!(matches!(
            state.on_initialized().unwrap_err(),
            Error::ConnectionClosed
        ));
    }

    #[test]
    fn test_init_request_recorded() {
        let state = state();
        assert!(state.init_request().is_none());

        state.on_initialize(init_params()).unwrap();
        let recorded = state.init_request().unwrap();
        assert_eq!(recorded.client_info.name, "test-client");
    }

    #[test]
    fn test_version_negotiation_fallback() {
        let state = state();
        let mut params = init_params();
        params.protocol_version = "1999-01-01".to_string();

        let result = state.on_initialize(params).unwrap();
        assert_eq!(result.protocol_version, PROTOCOL_VERSION);
    }
}
