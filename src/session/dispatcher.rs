//! Inbound message routing and connection wiring.
//!
//! One [`McpConnection`] per transport session owns the state machine,
//! the correlator, the cancellation table, and the log gate. The
//! [`Dispatcher`] consumes parsed envelopes in arrival order: the
//! decode/route step is sequential per connection, handler bodies run on
//! spawned tasks and may overlap freely across request ids.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::session::cancellation::{CancellationTracker, CancelledParams};
use crate::session::correlator::RequestCorrelator;
use crate::session::handler::{HandlerContext, HandlerRegistry};
use crate::session::logging::{LogGate, LogLevel, SetLevelParams};
use crate::session::progress::ProgressToken;
use crate::session::protocol::{
    methods, ClientCapabilities, InitializeParams, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId,
};
use crate::session::state::{SessionState, Status};
use crate::session::transport::{Message, Transport};

/// A connection from a client, alive for one transport session.
pub struct McpConnection {
    id: String,
    state: SessionState,
    log_gate: Arc<LogGate>,
    correlator: Arc<RequestCorrelator>,
    cancellations: CancellationTracker,
    /// Inbound requests currently being handled, with their start times.
    inbound: DashMap<RequestId, Instant>,
    outbound: mpsc::Sender<Message>,
    closed: CancellationToken,
    cancellation_grace: Duration,
    metrics: Arc<Metrics>,
}

impl McpConnection {
    pub fn new(
        outbound: mpsc::Sender<Message>,
        config: &Config,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        let closed = CancellationToken::new();
        let connection = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            state: SessionState::new(config.server_info.clone(), config.capabilities.clone()),
            log_gate: Arc::new(LogGate::new(outbound.clone(), config.log_level)),
            correlator: Arc::new(RequestCorrelator::new(
                outbound.clone(),
                closed.clone(),
                config.request_timeout,
            )),
            cancellations: CancellationTracker::new(),
            inbound: DashMap::new(),
            outbound,
            closed,
            cancellation_grace: config.cancellation_grace,
            metrics,
        });
        connection.metrics.connection_opened();
        connection
    }

    /// Connection identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle status.
    pub fn status(&self) -> Status {
        self.state.status()
    }

    /// The initialize request the client sent, if the handshake started.
    pub fn init_request(&self) -> Option<InitializeParams> {
        self.state.init_request()
    }

    /// Capabilities the client negotiated.
    pub fn client_capabilities(&self) -> ClientCapabilities {
        self.state.client_capabilities()
    }

    /// Current minimum log severity for this connection.
    pub fn log_level(&self) -> LogLevel {
        self.log_gate.level()
    }

    /// Gate for outbound log notifications.
    pub fn log_gate(&self) -> Arc<LogGate> {
        Arc::clone(&self.log_gate)
    }

    /// Correlator for server-initiated requests on this connection.
    pub fn correlator(&self) -> Arc<RequestCorrelator> {
        Arc::clone(&self.correlator)
    }

    /// Cancellation table for this connection.
    pub fn cancellations(&self) -> &CancellationTracker {
        &self.cancellations
    }

    /// Whether an inbound request is currently being handled.
    pub fn is_handling(&self, id: &RequestId) -> bool {
        self.inbound.contains_key(id)
    }

    pub(crate) fn outbound_sender(&self) -> mpsc::Sender<Message> {
        self.outbound.clone()
    }

    /// Close the connection.
    ///
    /// Idempotent. Every outbound waiter fails with `ConnectionClosed`;
    /// every in-flight inbound handler sees a cancellation record at its
    /// next checkpoint.
    pub fn close(&self) {
        if !self.state.on_close() {
            return;
        }
        self.closed.cancel();
        self.correlator.fail_all(|| Error::ConnectionClosed);
        for entry in self.inbound.iter() {
            self.cancellations
                .mark_cancelled(entry.key().clone(), Some("connection closed".to_string()));
        }
        self.metrics.connection_closed();
        info!("Connection {} closed", self.id);
    }

    /// Send the outcome of an inbound request back to the client.
    ///
    /// A `Cancelled` outcome sends nothing: the client already knows.
    pub(crate) async fn send_response(&self, id: RequestId, result: Result<Value>) {
        let message = match result {
            Ok(value) => {
                self.metrics.inc_success();
                Message::Response(JsonRpcResponse::success(id, value))
            }
            Err(e) if e.is_silent() => {
                self.metrics.inc_cancelled();
                debug!("Request {} abandoned without response: {}", id, e);
                return;
            }
            Err(e) => {
                self.metrics.inc_failed();
                Message::Response(JsonRpcResponse::error(id, e.to_json_rpc()))
            }
        };
        let _ = self.outbound.send(message).await;
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let params = params.ok_or_else(|| Error::InvalidParams("missing params".to_string()))?;
    serde_json::from_value(params).map_err(|e| Error::InvalidParams(e.to_string()))
}

/// Routes inbound envelopes for one connection.
pub struct Dispatcher {
    connection: Arc<McpConnection>,
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    pub fn new(connection: Arc<McpConnection>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            connection,
            registry,
        }
    }

    /// Process messages until the transport ends or the connection closes.
    pub async fn run(&self, mut incoming: mpsc::Receiver<Message>) {
        self.spawn_cancellation_gc();

        loop {
            tokio::select! {
                msg = incoming.recv() => match msg {
                    Some(msg) => self.dispatch(msg).await,
                    None => {
                        debug!("Transport ended for connection {}", self.connection.id());
                        break;
                    }
                },
                _ = self.connection.closed.cancelled() => break,
            }
        }

        self.connection.close();
    }

    /// Periodically purge cancellation records with no in-flight handler.
    fn spawn_cancellation_gc(&self) {
        let connection = Arc::clone(&self.connection);
        let grace = connection.cancellation_grace.max(Duration::from_millis(100));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(grace);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = connection.closed.cancelled() => break,
                    _ = interval.tick() => {
                        let purged = connection
                            .cancellations
                            .purge_stale(grace, |id| connection.is_handling(id));
                        if purged > 0 {
                            debug!("Purged {} stale cancellation records", purged);
                        }
                    }
                }
            }
        });
    }

    /// Route one envelope. Sequential per connection.
    async fn dispatch(&self, msg: Message) {
        match msg {
            Message::Response(response) => {
                self.connection.metrics.inc_responses();
                self.connection.correlator.resolve_response(response);
            }
            Message::Notification(notification) => {
                self.connection.metrics.inc_notifications();
                self.handle_notification(notification);
            }
            Message::Request(request) => {
                self.connection.metrics.inc_requests();
                self.handle_request(request).await;
            }
        }
    }

    fn handle_notification(&self, notification: JsonRpcNotification) {
        debug!("Handling notification: {}", notification.method);

        match notification.method.as_str() {
            methods::NOTIF_INITIALIZED => {
                if let Err(e) = self.connection.state.on_initialized() {
                    // No response channel for notifications; log and move on.
                    warn!("Ignoring initialized notification: {}", e);
                } else {
                    info!("Connection {} ready", self.connection.id());
                }
            }
            methods::NOTIF_CANCELLED => {
                match serde_json::from_value::<CancelledParams>(
                    notification.params.unwrap_or(Value::Null),
                ) {
                    Ok(params) => {
                        // Recorded even with no matching in-flight handler:
                        // the handler may not have started checking yet. The
                        // GC sweep bounds how long such records live.
                        if !self.connection.is_handling(&params.request_id) {
                            debug!(
                                "Cancellation for id {} with no in-flight handler",
                                params.request_id
                            );
                        }
                        self.connection
                            .cancellations
                            .mark_cancelled(params.request_id, params.reason);
                    }
                    Err(e) => warn!("Malformed cancellation params: {}", e),
                }
            }
            methods::NOTIF_ROOTS_CHANGED => {
                debug!("Client roots changed");
            }
            other => {
                debug!("Unknown notification: {}", other);
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) {
        debug!("Handling request: {} (id: {})", request.method, request.id);

        if let Err(e) = self.connection.state.ensure_ready(&request.method) {
            warn!("Rejecting {}: {}", request.method, e);
            self.connection.send_response(request.id, Err(e)).await;
            return;
        }

        match request.method.as_str() {
            methods::INITIALIZE => {
                let result = parse_params::<InitializeParams>(request.params)
                    .and_then(|params| self.connection.state.on_initialize(params))
                    .and_then(|r| serde_json::to_value(r).map_err(Error::from));
                self.connection.send_response(request.id, result).await;
            }
            methods::PING => {
                self.connection.send_response(request.id, Ok(json!({}))).await;
            }
            methods::SET_LOG_LEVEL => {
                let result = parse_params::<SetLevelParams>(request.params).map(|params| {
                    self.connection.log_gate.set_level(params.level);
                    json!({})
                });
                self.connection.send_response(request.id, result).await;
            }
            method => match self.registry.get(method) {
                Some(handler) => self.spawn_handler(handler, request),
                None => {
                    self.connection
                        .send_response(
                            request.id,
                            Err(Error::MethodNotFound(method.to_string())),
                        )
                        .await;
                }
            },
        }
    }

    /// Run a registered handler on its own task.
    fn spawn_handler(
        &self,
        handler: Arc<dyn crate::session::handler::RequestHandler>,
        request: JsonRpcRequest,
    ) {
        let connection = Arc::clone(&self.connection);
        let id = request.id.clone();
        connection.inbound.insert(id.clone(), Instant::now());

        let token = ProgressToken::from_request_params(&request.params);
        let ctx = HandlerContext::new(
            Arc::clone(&connection),
            id.clone(),
            request.method.clone(),
            token,
        );

        tokio::spawn(async move {
            let result = handler.handle(ctx, request.params).await;

            if let Some((_, started)) = connection.inbound.remove(&id) {
                debug!("Request {} finished in {:?}", id, started.elapsed());
            }
            connection.cancellations.clear(&id);
            connection.send_response(id, result).await;
        });
    }
}

/// Engine entry point: owns the registry and serves transports.
pub struct SessionEngine {
    registry: Arc<HandlerRegistry>,
    config: Config,
    metrics: Arc<Metrics>,
}

impl SessionEngine {
    pub fn new(registry: HandlerRegistry, config: Config) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
            metrics: Metrics::new(),
        }
    }

    /// Engine counters.
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Open a connection over raw message channels.
    ///
    /// The transport-free seam: tests and embedders wire their own
    /// channels, `run` wires a [`Transport`].
    pub fn open(&self, outbound: mpsc::Sender<Message>) -> (Arc<McpConnection>, Dispatcher) {
        let connection = McpConnection::new(outbound, &self.config, Arc::clone(&self.metrics));
        let dispatcher = Dispatcher::new(Arc::clone(&connection), Arc::clone(&self.registry));
        (connection, dispatcher)
    }

    /// Serve one session over the given transport.
    pub async fn run<T: Transport>(&self, mut transport: T) -> Result<()> {
        info!(
            "Starting session engine: {} v{}",
            self.config.server_info.name, self.config.server_info.version
        );

        let (incoming, outgoing) = transport.start().await?;
        let (connection, dispatcher) = self.open(outgoing);

        dispatcher.run(incoming).await;
        connection.close();

        transport.stop().await?;
        info!("Session engine stopped");
        Ok(())
    }
}
