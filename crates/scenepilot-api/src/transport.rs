//! Reconnecting WebSocket session to the control surface.
//!
//! [`TransportClient`] owns exactly one logical session: it performs the
//! Hello/Identify/Identified handshake, correlates requests with responses
//! by id, dispatches surface events to registered handlers, probes liveness
//! with a heartbeat request, and re-establishes the session with
//! exponential backoff when it drops unexpectedly.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──handshake ok──▶ Connected
//!                                                           │    │
//!                                           socket lost ◀───┘    └──disconnect()──▶ Closing ──▶ Disconnected
//!                                                │
//!                                          Reconnecting ──attempts exhausted──▶ Error
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::Error;
use crate::protocol::{
    self, EventMessage, EventSubscription, Identify, Inbound, OpCode, Request, RequestResponse,
    RPC_VERSION,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const EVENT_CHANNEL_CAPACITY: usize = 64;
const RECENT_ERRORS_CAPACITY: usize = 10;
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(300);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Request type used as the liveness probe.
pub const HEARTBEAT_REQUEST: &str = "GetVersion";

// ── ConnectionConfig ─────────────────────────────────────────────────

/// Connection parameters. Fixed for the lifetime of a [`TransportClient`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Sent verbatim as the `authentication` field of `Identify`.
    pub auth_token: Option<SecretString>,
    pub event_subscriptions: EventSubscription,
    /// Bound on opening the socket, and separately on each handshake step.
    pub connect_timeout: Duration,
    /// Zero disables the heartbeat.
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    /// Default per-request timeout.
    pub response_timeout: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
    pub reconnect_backoff: f64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 4455,
            auth_token: None,
            event_subscriptions: EventSubscription::default(),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(3),
            response_timeout: Duration::from_secs(5),
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_secs(2),
            reconnect_backoff: 1.5,
        }
    }
}

impl ConnectionConfig {
    /// Build and validate the `ws://host:port` address.
    pub fn url(&self) -> Result<Url, Error> {
        let address = format!("ws://{}:{}", self.host, self.port);
        let url = Url::parse(&address).map_err(|e| Error::InvalidAddress {
            address: address.clone(),
            reason: e.to_string(),
        })?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::InvalidAddress {
                address,
                reason: "missing host".into(),
            });
        }
        Ok(url)
    }
}

/// Delay before reconnect attempt `attempt` (1-based).
///
/// `base * backoff^(attempt - 1)`, never decreasing between attempts and
/// capped at five minutes.
pub fn reconnect_delay(config: &ConnectionConfig, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let factor = config.reconnect_backoff.max(1.0).powi(exponent);
    let secs = config.reconnect_base_delay.as_secs_f64() * factor;
    Duration::try_from_secs_f64(secs)
        .unwrap_or(MAX_RECONNECT_DELAY)
        .min(MAX_RECONNECT_DELAY)
}

// ── State & lifecycle events ─────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closing,
    Error,
}

/// Lifecycle notifications published on [`TransportClient::events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    ConnectionLost { reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    Reconnected,
    ReconnectFailed { attempts: u32 },
}

// ── Event handlers ───────────────────────────────────────────────────

/// Opaque token returned by [`TransportClient::on_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type EventHandler = Arc<dyn Fn(&Value) -> HandlerResult + Send + Sync>;

// ── Statistics ───────────────────────────────────────────────────────

/// Point-in-time snapshot of transport counters.
#[derive(Debug, Clone, Serialize)]
pub struct TransportStats {
    pub state: ConnectionState,
    pub url: String,
    pub total_connections: u64,
    pub reconnect_attempts: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub connected_at: Option<DateTime<Utc>>,
    pub uptime_secs: Option<i64>,
    pub pending_requests: usize,
    pub event_handlers: BTreeMap<String, usize>,
    pub recent_errors: Vec<String>,
}

#[derive(Debug, Default)]
struct Counters {
    total_connections: u64,
    reconnect_attempts: u64,
    messages_sent: u64,
    messages_received: u64,
    last_heartbeat: Option<DateTime<Utc>>,
    connected_at: Option<DateTime<Utc>>,
    recent_errors: VecDeque<String>,
}

// ── TransportClient ──────────────────────────────────────────────────

/// Cheaply cloneable handle to a single control-surface session.
///
/// Background tasks hold a reference to the shared state, so call
/// [`disconnect`](Self::disconnect) before dropping the last handle.
#[derive(Clone)]
pub struct TransportClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectionConfig,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    pending: DashMap<String, oneshot::Sender<Result<RequestResponse, Error>>>,
    next_request_id: AtomicU64,
    next_handler_id: AtomicU64,
    next_generation: AtomicU64,
    handlers: RwLock<HashMap<String, Vec<(HandlerId, EventHandler)>>>,
    session: Mutex<Option<Session>>,
    /// Serializes connection attempts; held for the whole handshake.
    connect_lock: tokio::sync::Mutex<()>,
    reconnect: Mutex<Option<ReconnectTask>>,
    counters: Mutex<Counters>,
}

struct Session {
    generation: u64,
    writer: Arc<tokio::sync::Mutex<WsSink>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

struct ReconnectTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TransportClient {
    pub fn new(config: ConnectionConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                state_tx,
                events_tx,
                pending: DashMap::new(),
                next_request_id: AtomicU64::new(1),
                next_handler_id: AtomicU64::new(1),
                next_generation: AtomicU64::new(1),
                handlers: RwLock::new(HashMap::new()),
                session: Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
                reconnect: Mutex::new(None),
                counters: Mutex::new(Counters::default()),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Open the socket and complete the handshake.
    ///
    /// Returns immediately if already connected. Fails with
    /// [`Error::ReconnectInProgress`] while the background reconnect loop
    /// owns the session.
    pub async fn connect(&self) -> Result<(), Error> {
        let _guard = self.inner.connect_lock.lock().await;

        match self.state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Reconnecting => return Err(Error::ReconnectInProgress),
            _ => {}
        }

        self.inner.set_state(ConnectionState::Connecting);
        match self.inner.open_session().await {
            Ok(()) => {
                info!(url = %self.inner.display_url(), "connected to control surface");
                self.inner.emit(ConnectionEvent::Connected);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "connection attempt failed");
                self.inner.record_error(&e);
                self.inner.set_state(ConnectionState::Error);
                Err(e)
            }
        }
    }

    /// Tear the session down.
    ///
    /// Cancels the reconnect loop, stops the receive and heartbeat tasks,
    /// fails every pending request with [`Error::ConnectionLost`], then closes
    /// the socket. Must not be awaited from inside an event handler.
    pub async fn disconnect(&self) {
        let inner = &self.inner;

        let reconnect = {
            let mut slot = lock(&inner.reconnect);
            if self.state() == ConnectionState::Disconnected && slot.is_none() {
                return;
            }
            inner.set_state(ConnectionState::Closing);
            slot.take()
        };

        if let Some(task) = reconnect {
            task.cancel.cancel();
            let _ = task.handle.await;
        }

        let session = lock(&inner.session).take();
        let writer = match session {
            Some(session) => {
                session.cancel.cancel();
                for task in session.tasks {
                    let _ = task.await;
                }
                Some(session.writer)
            }
            None => None,
        };

        inner.fail_pending("client disconnected");

        if let Some(writer) = writer {
            let mut sink = writer.lock().await;
            match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
                Ok(Ok(())) => trace!("socket closed"),
                Ok(Err(e)) => debug!(error = %e, "error closing socket"),
                Err(_) => debug!("timed out closing socket"),
            }
        }

        lock(&inner.counters).connected_at = None;
        inner.set_state(ConnectionState::Disconnected);
        inner.emit(ConnectionEvent::Disconnected);
        info!("disconnected from control surface");
    }

    // ── Messaging ────────────────────────────────────────────────────

    /// Send a request and wait for the correlated response.
    ///
    /// `timeout` defaults to `response_timeout`. A timeout is reported as
    /// [`Error::RequestTimeout`] and is never retried here. The returned
    /// response may carry a failed `requestStatus`; see
    /// [`RequestResponse::into_result`].
    pub async fn send_request(
        &self,
        request_type: &str,
        request_data: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<RequestResponse, Error> {
        let timeout = timeout.unwrap_or(self.inner.config.response_timeout);
        self.inner.request(request_type, request_data, timeout).await
    }

    /// Send a fire-and-forget event frame.
    pub async fn send_event(&self, event_type: &str, event_data: Value) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let message = EventMessage {
            event_type: event_type.to_owned(),
            event_intent: 0,
            event_data,
        };
        let frame = protocol::encode(OpCode::Event, &message)?;
        self.inner.write(frame).await
    }

    /// Register a handler for an event type. Handlers for the same event run
    /// in registration order on the receive loop and must return quickly.
    pub fn on_event<F>(&self, event_type: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&Value) -> HandlerResult + Send + Sync + 'static,
    {
        let id = HandlerId(self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed));
        let mut handlers = write_lock(&self.inner.handlers);
        handlers
            .entry(event_type.into())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn remove_event_handler(&self, event_type: &str, id: HandlerId) -> bool {
        let mut handlers = write_lock(&self.inner.handlers);
        let Some(list) = handlers.get_mut(event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event_type);
        }
        removed
    }

    pub fn statistics(&self) -> TransportStats {
        let inner = &self.inner;
        let counters = lock(&inner.counters);
        let event_handlers = read_lock(&inner.handlers)
            .iter()
            .map(|(name, list)| (name.clone(), list.len()))
            .collect();

        TransportStats {
            state: self.state(),
            url: inner.display_url(),
            total_connections: counters.total_connections,
            reconnect_attempts: counters.reconnect_attempts,
            messages_sent: counters.messages_sent,
            messages_received: counters.messages_received,
            last_heartbeat: counters.last_heartbeat,
            connected_at: counters.connected_at,
            uptime_secs: counters
                .connected_at
                .map(|at| (Utc::now() - at).num_seconds()),
            pending_requests: inner.pending.len(),
            event_handlers,
            recent_errors: counters.recent_errors.iter().cloned().collect(),
        }
    }
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient")
            .field("url", &self.inner.display_url())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ── Inner: session setup ─────────────────────────────────────────────

impl Inner {
    fn display_url(&self) -> String {
        format!("ws://{}:{}", self.config.host, self.config.port)
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state changed");
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.events_tx.send(event);
    }

    fn record_error(&self, err: &Error) {
        let mut counters = lock(&self.counters);
        if counters.recent_errors.len() == RECENT_ERRORS_CAPACITY {
            counters.recent_errors.pop_front();
        }
        counters
            .recent_errors
            .push_back(format!("{}: {err}", Utc::now().to_rfc3339()));
    }

    /// Open the socket, handshake, and start the receive and heartbeat tasks.
    ///
    /// Leaves the state at `Connected` on success; the caller owns the state
    /// on failure.
    async fn open_session(self: &Arc<Self>) -> Result<(), Error> {
        let url = self.config.url()?;
        let timeout = self.config.connect_timeout;
        debug!(url = %url, "opening socket");

        let opened = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url.as_str())).await;
        let mut ws = match opened {
            Err(_) => {
                return Err(Error::ConnectTimeout {
                    url: url.to_string(),
                    timeout,
                });
            }
            Ok(Err(e)) => {
                return Err(Error::ConnectionFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
            Ok(Ok((ws, _response))) => ws,
        };

        if let Err(e) = self.handshake(&mut ws).await {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await;
            return Err(e);
        }

        let (sink, source) = ws.split();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        {
            let mut counters = lock(&self.counters);
            counters.total_connections += 1;
            counters.connected_at = Some(Utc::now());
        }
        self.set_state(ConnectionState::Connected);

        // Tasks are spawned while the slot is locked so a loss reported by a
        // task always finds its own session.
        let mut slot = lock(&self.session);
        let mut tasks = vec![tokio::spawn(receive_loop(
            Arc::clone(self),
            source,
            cancel.clone(),
            generation,
        ))];
        if !self.config.heartbeat_interval.is_zero() {
            tasks.push(tokio::spawn(heartbeat_loop(
                Arc::clone(self),
                cancel.clone(),
                generation,
            )));
        }
        *slot = Some(Session {
            generation,
            writer: Arc::new(tokio::sync::Mutex::new(sink)),
            cancel,
            tasks,
        });
        Ok(())
    }

    async fn handshake(&self, ws: &mut WsStream) -> Result<(), Error> {
        let timeout = self.config.connect_timeout;

        let hello = match tokio::time::timeout(timeout, next_inbound(ws)).await {
            Err(_) => return Err(handshake_err("timed out waiting for Hello")),
            Ok(Ok(Inbound::Hello(hello))) => hello,
            Ok(Ok(other)) => return Err(handshake_err(format!("expected Hello, got {other:?}"))),
            Ok(Err(e)) => return Err(e),
        };
        debug!(
            server_version = hello.server_version.as_deref().unwrap_or("unknown"),
            rpc_version = hello.rpc_version,
            "received Hello"
        );

        if hello.authentication.is_some() && self.config.auth_token.is_none() {
            return Err(handshake_err(
                "surface requires authentication but no token is configured",
            ));
        }

        let identify = Identify {
            rpc_version: RPC_VERSION,
            authentication: self
                .config
                .auth_token
                .as_ref()
                .map(|token| token.expose_secret().to_owned()),
            event_subscriptions: self.config.event_subscriptions,
        };
        let frame = protocol::encode(OpCode::Identify, &identify)?;
        ws.send(Message::text(frame))
            .await
            .map_err(|e| handshake_err(format!("failed to send Identify: {e}")))?;

        match tokio::time::timeout(timeout, next_inbound(ws)).await {
            Err(_) => Err(handshake_err("timed out waiting for Identified")),
            Ok(Ok(Inbound::Identified(identified))) => {
                debug!(
                    rpc_version = identified.negotiated_rpc_version,
                    "session identified"
                );
                Ok(())
            }
            Ok(Ok(other)) => Err(handshake_err(format!(
                "expected Identified, got {other:?}"
            ))),
            Ok(Err(e)) => Err(e),
        }
    }

    // ── Inner: messaging ─────────────────────────────────────────────

    async fn request(
        &self,
        request_type: &str,
        request_data: Option<Value>,
        timeout: Duration,
    ) -> Result<RequestResponse, Error> {
        if *self.state_tx.borrow() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }

        let request_id = self
            .next_request_id
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        let frame = protocol::encode(
            OpCode::Request,
            &Request {
                request_type: request_type.to_owned(),
                request_id: request_id.clone(),
                request_data,
            },
        )?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            request_id: &request_id,
        };

        trace!(request_type, request_id = %request_id, "sending request");
        self.write(frame).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionLost {
                reason: "request dropped".into(),
            }),
            Err(_) => {
                warn!(request_type, request_id = %request_id, "request timed out");
                Err(Error::RequestTimeout {
                    request_type: request_type.to_owned(),
                    request_id: request_id.clone(),
                    timeout,
                })
            }
        }
    }

    async fn write(&self, frame: String) -> Result<(), Error> {
        let writer = lock(&self.session)
            .as_ref()
            .map(|session| Arc::clone(&session.writer))
            .ok_or(Error::NotConnected)?;

        writer
            .lock()
            .await
            .send(Message::text(frame))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        lock(&self.counters).messages_sent += 1;
        Ok(())
    }

    fn fail_pending(&self, reason: &str) {
        let ids: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        if !ids.is_empty() {
            debug!(count = ids.len(), reason, "failing pending requests");
        }
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(Error::ConnectionLost {
                    reason: reason.to_owned(),
                }));
            }
        }
    }

    // ── Inner: inbound dispatch ──────────────────────────────────────

    fn dispatch(&self, text: &str) {
        lock(&self.counters).messages_received += 1;

        match protocol::decode(text) {
            Ok(Inbound::RequestResponse(response)) => {
                match self.pending.remove(&response.request_id) {
                    Some((_, tx)) => {
                        let _ = tx.send(Ok(response));
                    }
                    None => debug!(
                        request_id = %response.request_id,
                        "response for unknown or expired request"
                    ),
                }
            }
            Ok(Inbound::Event(event)) => self.invoke_handlers(&event),
            Ok(other) => trace!(message = ?other, "ignoring frame"),
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                self.record_error(&e);
            }
        }
    }

    fn invoke_handlers(&self, event: &EventMessage) {
        let handlers: Vec<EventHandler> = read_lock(&self.handlers)
            .get(&event.event_type)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        trace!(event_type = %event.event_type, handlers = handlers.len(), "dispatching event");

        for handler in handlers {
            match std::panic::catch_unwind(AssertUnwindSafe(|| handler(&event.event_data))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(event_type = %event.event_type, error = %e, "event handler failed");
                }
                Err(_) => {
                    error!(event_type = %event.event_type, "event handler panicked");
                }
            }
        }
    }

    // ── Inner: loss & reconnection ───────────────────────────────────

    /// Tear down session `generation` after an unexpected loss.
    ///
    /// A no-op if that session is already gone (disconnect or a sibling task
    /// got there first).
    fn handle_connection_loss(self: &Arc<Self>, generation: u64, reason: &str) {
        let session = {
            let mut slot = lock(&self.session);
            match slot.as_ref() {
                Some(session) if session.generation == generation => slot.take(),
                _ => None,
            }
        };
        let Some(session) = session else {
            return;
        };

        warn!(reason, "connection to control surface lost");
        session.cancel.cancel();
        self.fail_pending(reason);
        self.record_error(&Error::ConnectionLost {
            reason: reason.to_owned(),
        });
        lock(&self.counters).connected_at = None;
        self.emit(ConnectionEvent::ConnectionLost {
            reason: reason.to_owned(),
        });

        let mut slot = lock(&self.reconnect);
        if *self.state_tx.borrow() != ConnectionState::Connected {
            return;
        }
        if self.config.max_reconnect_attempts == 0 {
            self.set_state(ConnectionState::Error);
            self.emit(ConnectionEvent::ReconnectFailed { attempts: 0 });
            return;
        }
        self.set_state(ConnectionState::Reconnecting);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(reconnect_loop(Arc::clone(self), cancel.clone()));
        *slot = Some(ReconnectTask { cancel, handle });
    }
}

/// Removes a pending entry when the waiting future finishes or is dropped.
struct PendingGuard<'a> {
    pending: &'a DashMap<String, oneshot::Sender<Result<RequestResponse, Error>>>,
    request_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.request_id);
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn receive_loop(
    inner: Arc<Inner>,
    mut source: WsSource,
    cancel: CancellationToken,
    generation: u64,
) {
    let reason = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => inner.dispatch(&text),
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(cf) => format!("closed by surface ({}): {}", cf.code, cf.reason),
                        None => "closed by surface".to_owned(),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break format!("socket error: {e}"),
                None => break "stream ended".to_owned(),
            },
        }
    };

    inner.handle_connection_loss(generation, &reason);
}

async fn heartbeat_loop(inner: Arc<Inner>, cancel: CancellationToken, generation: u64) {
    let interval = inner.config.heartbeat_interval;
    let timeout = inner.config.heartbeat_timeout;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(interval) => {}
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = inner.request(HEARTBEAT_REQUEST, None, timeout) => result,
        };

        match result {
            Ok(_) => {
                trace!("heartbeat ok");
                lock(&inner.counters).last_heartbeat = Some(Utc::now());
            }
            Err(e) => {
                inner.handle_connection_loss(generation, &format!("heartbeat failed: {e}"));
                return;
            }
        }
    }
}

async fn reconnect_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    let max_attempts = inner.config.max_reconnect_attempts;

    for attempt in 1..=max_attempts {
        let delay = reconnect_delay(&inner.config, attempt);
        info!(
            attempt,
            max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnecting to control surface"
        );
        inner.emit(ConnectionEvent::Reconnecting { attempt, delay });
        lock(&inner.counters).reconnect_attempts += 1;

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = async {
                let _guard = inner.connect_lock.lock().await;
                inner.open_session().await
            } => result,
        };

        match result {
            Ok(()) => {
                info!(attempt, "reconnected to control surface");
                lock(&inner.reconnect).take();
                inner.emit(ConnectionEvent::Reconnected);
                return;
            }
            Err(e) => {
                warn!(attempt, error = %e, "reconnect attempt failed");
                inner.record_error(&e);
            }
        }
    }

    error!(attempts = max_attempts, "all reconnect attempts failed");
    lock(&inner.reconnect).take();
    inner.set_state(ConnectionState::Error);
    inner.emit(ConnectionEvent::ReconnectFailed {
        attempts: max_attempts,
    });
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Read frames until one decodes to a protocol message.
async fn next_inbound(ws: &mut WsStream) -> Result<Inbound, Error> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return protocol::decode(&text)
                    .map_err(|e| handshake_err(format!("invalid handshake frame: {e}")));
            }
            Some(Ok(Message::Close(_))) => return Err(handshake_err("socket closed by surface")),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(handshake_err(format!("socket error: {e}"))),
            None => return Err(handshake_err("socket closed by surface")),
        }
    }
}

fn handshake_err(reason: impl Into<String>) -> Error {
    Error::Handshake {
        reason: reason.into(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}
