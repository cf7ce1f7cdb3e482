//! Request handlers and the method registration table.
//!
//! The engine does not discover features; callers assemble a
//! [`HandlerRegistry`] at startup mapping method names to handlers, and
//! the dispatcher consults it as an opaque table. Each invocation gets a
//! [`HandlerContext`] carrying the per-request collaborators.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::session::cancellation::Cancellation;
use crate::session::client::{Elicitation, Roots, Sampling};
use crate::session::dispatcher::McpConnection;
use crate::session::logging::McpLog;
use crate::session::progress::{Progress, ProgressToken};
use crate::session::protocol::RequestId;

/// Handler for one inbound request method.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Execute the request. Returning `Error::Cancelled` abandons the
    /// request without a response envelope.
    async fn handle(&self, ctx: HandlerContext, params: Option<Value>) -> Result<Value>;
}

/// Adapter so plain async closures can act as handlers.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(HandlerContext, Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn handle(&self, ctx: HandlerContext, params: Option<Value>) -> Result<Value> {
        (self.0)(ctx, params).await
    }
}

/// Registry of method handlers, assembled at startup.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn RequestHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a method name.
    pub fn register<H: RequestHandler + 'static>(&mut self, method: impl Into<String>, handler: H) {
        self.handlers.insert(method.into(), Arc::new(handler));
    }

    /// Register an async closure for a method name.
    pub fn register_fn<F, Fut>(&mut self, method: impl Into<String>, f: F)
    where
        F: Fn(HandlerContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register(method, FnHandler(f));
    }

    /// Look up a handler by method name.
    pub fn get(&self, method: &str) -> Option<Arc<dyn RequestHandler>> {
        self.handlers.get(method).cloned()
    }

    /// Check if a method is registered.
    pub fn has(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names.
    pub fn methods(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-request collaborators handed to a handler.
#[derive(Clone)]
pub struct HandlerContext {
    id: RequestId,
    method: String,
    connection: Arc<McpConnection>,
    cancellation: Cancellation,
    progress_token: Option<ProgressToken>,
    log: McpLog,
}

impl HandlerContext {
    pub(crate) fn new(
        connection: Arc<McpConnection>,
        id: RequestId,
        method: String,
        progress_token: Option<ProgressToken>,
    ) -> Self {
        let cancellation = connection.cancellations().handle(id.clone());
        let log = McpLog::new(connection.log_gate(), method.clone());
        Self {
            id,
            method,
            connection,
            cancellation,
            progress_token,
            log,
        }
    }

    /// Id of the request being handled.
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Method name being handled.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Read-only view of the owning connection.
    pub fn connection(&self) -> &McpConnection {
        &self.connection
    }

    /// Cancellation poll for this request.
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// Client-facing logger named after the handled method.
    pub fn log(&self) -> &McpLog {
        &self.log
    }

    /// Open progress reporting for this request.
    ///
    /// The disabled sentinel comes back when the client sent no progress
    /// token, so the handler can report unconditionally.
    pub fn progress(&self, total: Option<f64>) -> Progress {
        Progress::open(
            self.progress_token.clone(),
            total,
            self.connection.outbound_sender(),
        )
    }

    /// Open progress reporting with a custom default step.
    pub fn progress_with_step(&self, total: Option<f64>, step: f64) -> Progress {
        Progress::open_with_step(
            self.progress_token.clone(),
            total,
            step,
            self.connection.outbound_sender(),
        )
    }

    /// Sampling facade bound to this request's cancellation.
    pub fn sampling(&self) -> Sampling {
        Sampling::new(
            self.connection.correlator(),
            self.cancellation.clone(),
            self.connection.client_capabilities().sampling,
        )
    }

    /// Elicitation facade bound to this request's cancellation.
    pub fn elicitation(&self) -> Elicitation {
        Elicitation::new(
            self.connection.correlator(),
            self.cancellation.clone(),
            self.connection.client_capabilities().elicitation,
        )
    }

    /// Roots facade bound to this request's cancellation.
    pub fn roots(&self) -> Roots {
        Roots::new(
            self.connection.correlator(),
            self.cancellation.clone(),
            self.connection.client_capabilities().roots.is_some(),
        )
    }
}

/// Helper to extract a required string argument from request params.
pub fn get_string_arg(params: &Option<Value>, name: &str) -> Result<String> {
    params
        .as_ref()
        .and_then(|p| p.get(name))
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| {
            crate::error::Error::InvalidParams(format!("Missing required argument: {}", name))
        })
}

/// Helper to extract a required integer argument from request params.
pub fn get_int_arg(params: &Option<Value>, name: &str) -> Result<i64> {
    params
        .as_ref()
        .and_then(|p| p.get(name))
        .and_then(|v| v.as_i64())
        .ok_or_else(|| {
            crate::error::Error::InvalidParams(format!("Missing required argument: {}", name))
        })
}
