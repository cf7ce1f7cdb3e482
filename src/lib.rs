//! Session Engine - Bidirectional MCP Protocol Core
//!
//! A session protocol engine for the Model Context Protocol, layered on
//! JSON-RPC 2.0. Either peer may initiate requests: clients call
//! registered server methods, and the server may issue its own requests
//! back to the client mid-call (sampling an LLM, eliciting user input,
//! listing roots), correlating the eventual response with the in-flight
//! call that triggered it.
//!
//! # Architecture
//!
//! 1. **Protocol Layer** (`session::protocol`, `session::transport`) -
//!    JSON-RPC envelopes and the stdio transport
//! 2. **Engine Layer** (`session`) - lifecycle state machine, request
//!    correlation, cancellation, progress, log gating, dispatch
//! 3. **Handler Surface** (`session::handler`) - registration table and
//!    the per-request context injected into handlers
//!
//! # Concurrency Model
//!
//! One connection is shared by many concurrently-executing handler
//! tasks. All writes funnel through a single outbound channel per
//! connection; correlation bookkeeping uses per-entry locking so a slow
//! handler never blocks another request's response. Cancellation is
//! cooperative: handlers observe it at checkpoints, nothing preempts
//! them.

pub mod config;
pub mod error;
pub mod metrics;
pub mod session;

pub use error::{Error, Result};

/// Engine version reported during the initialize handshake.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
