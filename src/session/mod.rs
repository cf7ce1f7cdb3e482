//! Session protocol engine.
//!
//! Everything one connection needs to speak bidirectional JSON-RPC:
//! envelope types, lifecycle state, request correlation, cancellation,
//! progress, log gating, and the inbound dispatcher that ties them
//! together.
//!
//! # Architecture
//!
//! - `protocol` - JSON-RPC envelopes and handshake types
//! - `transport` - Message channels and the stdio transport
//! - `state` - Per-connection lifecycle state machine
//! - `correlator` - Outbound request/response matching
//! - `cancellation` - Cooperative cancellation records
//! - `progress` - Per-request progress notifications
//! - `logging` - Severity-gated client log notifications
//! - `client` - Server-initiated sampling/elicitation/roots facades
//! - `handler` - Handler contract and registration table
//! - `dispatcher` - Connection wiring and inbound routing

pub mod cancellation;
pub mod client;
pub mod correlator;
pub mod dispatcher;
pub mod handler;
pub mod logging;
pub mod progress;
pub mod protocol;
pub mod state;
pub mod transport;

pub use cancellation::{Cancellation, CancellationTracker};
pub use client::{Elicitation, Roots, Sampling};
pub use correlator::{RequestCorrelator, ResponseFuture};
pub use dispatcher::{Dispatcher, McpConnection, SessionEngine};
pub use handler::{HandlerContext, HandlerRegistry, RequestHandler};
pub use logging::{LogGate, LogLevel, McpLog};
pub use progress::{Progress, ProgressToken};
pub use protocol::*;
pub use state::{SessionState, Status};
pub use transport::{Message, StdioTransport, Transport};
