//! WebSocket push channel with auto-reconnect.
//!
//! Maintains one authenticated socket to a device, sends the two bootstrap
//! requests (summary + state) on every successful connect, and forwards
//! parsed inbound messages, in arrival order, through a
//! [`tokio::sync::mpsc`] queue. Connection failures are retried with
//! exponential backoff; credential rejections and unexpected failures stop
//! the channel for good.
//!
//! # Example
//!
//! ```rust,ignore
//! use swidget_api::transport::TransportConfig;
//! use swidget_api::websocket::{ReconnectPolicy, WebSocketChannel};
//!
//! let url = WebSocketChannel::device_url("192.168.1.20", &secret)?;
//! let (channel, mut inbound) =
//!     WebSocketChannel::new(url, &TransportConfig::default(), ReconnectPolicy::default())?;
//! channel.start().await;
//!
//! while let Some(message) = inbound.recv().await {
//!     println!("{:?}: {}", message.kind(), message.request_id);
//! }
//!
//! channel.close().await;
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::Connector;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::Error;
use crate::models::SocketRequest;
use crate::transport::{SECRET_HEADER, TransportConfig};

// ── Constants ────────────────────────────────────────────────────────

const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// Consecutive connection failures tolerated before the channel stops.
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

/// `request_id` the firmware uses for unsolicited summary pushes.
pub const DYNAMIC_UPDATE: &str = "DYNAMIC_UPDATE";

// ── State ────────────────────────────────────────────────────────────

/// Lifecycle of the channel.
///
/// `Starting → Connected → Disconnected → Starting | Stopped`. A channel
/// that has never been started reports `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Starting,
    Connected,
    Disconnected,
    Stopped,
}

/// Why a channel reached [`ChannelState::Stopped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit [`WebSocketChannel::close`].
    Closed,
    /// The device rejected the secret during the handshake.
    AuthorizationFailure,
    /// Connection failures exhausted the retry budget.
    TooManyRetries,
    /// Anything else.
    Unknown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::AuthorizationFailure => "authorization failure",
            Self::TooManyRetries => "too many retries",
            Self::Unknown => "unknown",
        })
    }
}

// ── ReconnectPolicy ──────────────────────────────────────────────────

/// Backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay after the first failure. Default: 30s.
    pub base_delay: Duration,

    /// Upper bound on backoff delay. Default: 300s.
    pub max_delay: Duration,

    /// Consecutive failures tolerated before stopping. Default: 5.
    pub max_failed_attempts: u32,

    /// Pause before reconnecting after the device closed a healthy
    /// session. Default: 5s.
    pub reconnect_delay: Duration,

    /// Upper bound on a single connect + upgrade handshake. Default: 10s.
    pub handshake_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(300),
            max_failed_attempts: MAX_FAILED_ATTEMPTS,
            reconnect_delay: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Backoff after the `failed_attempts`-th consecutive failure (1-based).
///
/// `delay = min(2^(failed_attempts - 1) * base, max)`
pub fn retry_delay(failed_attempts: u32, policy: &ReconnectPolicy) -> Duration {
    let exponent = failed_attempts.saturating_sub(1).min(31);
    policy
        .base_delay
        .saturating_mul(2_u32.saturating_pow(exponent))
        .min(policy.max_delay)
}

// ── Inbound messages ─────────────────────────────────────────────────

/// How an inbound message should be merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Full summary (reply to the bootstrap request or a dynamic update).
    Summary,
    /// Full state snapshot.
    State,
    /// Echo of a command sent over the socket.
    Command,
    /// Anything else; ignored by the state store.
    Other,
}

impl MessageKind {
    pub fn from_request_id(request_id: &str) -> Self {
        match request_id {
            "summary" | DYNAMIC_UPDATE => Self::Summary,
            "state" => Self::State,
            "command" => Self::Command,
            _ => Self::Other,
        }
    }
}

/// A parsed text frame.
///
/// `body` holds every field except `request_id`, so it deserializes
/// directly into the REST response types.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub request_id: String,
    pub body: Map<String, Value>,
}

impl InboundMessage {
    pub fn kind(&self) -> MessageKind {
        MessageKind::from_request_id(&self.request_id)
    }

    /// The body as a JSON object value.
    pub fn into_body(self) -> Value {
        Value::Object(self.body)
    }
}

/// Parse a text frame. Non-JSON and non-object frames are dropped.
pub fn parse_message(text: &str) -> Option<InboundMessage> {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, "Failed to parse WebSocket message");
            return None;
        }
    };

    let Value::Object(mut body) = value else {
        debug!("Ignoring non-object WebSocket message");
        return None;
    };

    let request_id = match body.remove("request_id") {
        Some(Value::String(id)) => id,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    Some(InboundMessage { request_id, body })
}

// ── Failure classification ───────────────────────────────────────────

/// Outcome of a session that ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// `close()` was called.
    Cancelled,
    /// The device closed the socket or the stream ended.
    PeerClosed,
}

/// Failure of a connect-and-receive cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Failure {
    /// Credential rejected: never retried.
    Auth(String),
    /// Network-level failure: retried with backoff.
    Connection(String),
    /// Anything unexpected: stops the channel.
    Fatal(String),
}

fn classify_connect_error(err: &tungstenite::Error) -> Failure {
    match err {
        tungstenite::Error::Http(response)
            if response.status() == tungstenite::http::StatusCode::UNAUTHORIZED =>
        {
            Failure::Auth(format!("handshake rejected with HTTP {}", response.status()))
        }
        tungstenite::Error::Http(response) => {
            Failure::Fatal(format!("unexpected handshake response HTTP {}", response.status()))
        }
        tungstenite::Error::Io(_)
        | tungstenite::Error::Tls(_)
        | tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Protocol(_) => Failure::Connection(err.to_string()),
        _ => Failure::Fatal(err.to_string()),
    }
}

// ── WebSocketChannel ─────────────────────────────────────────────────

/// Handle to a device's push channel.
///
/// Cheaply cloneable; all clones drive and observe the same socket.
#[derive(Clone)]
pub struct WebSocketChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    url: Url,
    tls: Option<Arc<rustls::ClientConfig>>,
    policy: ReconnectPolicy,
    state: watch::Sender<ChannelState>,
    stop_reason: StdMutex<Option<StopReason>>,
    failed_attempts: AtomicU32,
    /// Writer queue of the live socket; `None` while disconnected.
    outbound: StdMutex<Option<mpsc::UnboundedSender<String>>>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketChannel {
    /// Build the push URL for a device: `wss://{host}/api/v1/sock?x-secret-key={secret}`.
    pub fn device_url(host: &str, secret: &SecretString) -> Result<Url, Error> {
        let mut url = Url::parse(&format!("wss://{host}/api/v1/sock"))?;
        url.query_pairs_mut()
            .append_pair(SECRET_HEADER, secret.expose_secret());
        Ok(url)
    }

    /// Create a channel and the receiver its inbound messages arrive on.
    ///
    /// Nothing connects until [`start`](Self::start) or
    /// [`listen`](Self::listen) is called.
    pub fn new(
        url: Url,
        transport: &TransportConfig,
        policy: ReconnectPolicy,
    ) -> Result<(Self, mpsc::Receiver<InboundMessage>), Error> {
        let tls = if url.scheme() == "wss" {
            transport.websocket_tls()?
        } else {
            None
        };
        let (state, _) = watch::channel(ChannelState::Disconnected);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        let channel = Self {
            inner: Arc::new(ChannelInner {
                url,
                tls,
                policy,
                state,
                stop_reason: StdMutex::new(None),
                failed_attempts: AtomicU32::new(0),
                outbound: StdMutex::new(None),
                inbound_tx,
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        };
        Ok((channel, inbound_rx))
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn state(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    /// Reason recorded when the channel stopped, if it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        *self.inner.stop_reason.lock().expect("stop reason lock poisoned")
    }

    pub fn failed_attempts(&self) -> u32 {
        self.inner.failed_attempts.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == ChannelState::Stopped
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn [`listen`](Self::listen) as a background task.
    ///
    /// No-op if the loop is already running or the channel has stopped.
    pub async fn start(&self) {
        let mut task = self.inner.task.lock().await;
        if task.is_some() || self.is_stopped() {
            return;
        }
        let channel = self.clone();
        *task = Some(tokio::spawn(async move { channel.listen().await }));
    }

    /// Outer driver: run connect-and-receive cycles until the channel stops.
    pub async fn listen(&self) {
        self.inner.failed_attempts.store(0, Ordering::SeqCst);
        while !self.is_stopped() {
            self.run_cycle().await;
        }
        debug!(reason = ?self.stop_reason(), "WebSocket loop exiting");
    }

    /// Stop the channel, release the socket and wait for the loop to exit.
    ///
    /// Idempotent. No message is queued after this returns.
    pub async fn close(&self) {
        self.stop(StopReason::Closed);
        self.inner.cancel.cancel();
        self.clear_outbound();

        let handle = self.inner.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "WebSocket task ended abnormally");
            }
        }
    }

    // ── Sending ──────────────────────────────────────────────────────

    /// Queue a text frame on the active socket.
    pub fn send(&self, text: impl Into<String>) -> Result<(), Error> {
        let guard = self.inner.outbound.lock().expect("outbound lock poisoned");
        match guard.as_ref() {
            Some(tx) => tx
                .send(text.into())
                .map_err(|_| Error::WebSocketNotConnected),
            None => Err(Error::WebSocketNotConnected),
        }
    }

    /// Wrap a REST command body in the socket envelope and send it.
    pub fn send_command(&self, body: &Value) -> Result<(), Error> {
        self.send(SocketRequest::command(body).to_text())
    }

    // ── Internals ────────────────────────────────────────────────────

    fn set_state(&self, next: ChannelState) {
        self.inner.state.send_if_modified(|current| {
            if *current == ChannelState::Stopped || *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Enter `Stopped`, keeping the first recorded reason.
    fn stop(&self, reason: StopReason) {
        {
            let mut guard = self.inner.stop_reason.lock().expect("stop reason lock poisoned");
            if guard.is_none() {
                *guard = Some(reason);
            }
        }
        self.inner.state.send_if_modified(|current| {
            let changed = *current != ChannelState::Stopped;
            *current = ChannelState::Stopped;
            changed
        });
    }

    fn clear_outbound(&self) {
        self.inner
            .outbound
            .lock()
            .expect("outbound lock poisoned")
            .take();
    }

    /// Sleep unless the channel is closed first.
    async fn pause(&self, delay: Duration) {
        tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => {}
            () = tokio::time::sleep(delay) => {}
        }
    }

    /// One `Starting → ...` cycle, ending in `Disconnected` (after the
    /// backoff pause) or `Stopped`.
    async fn run_cycle(&self) {
        self.set_state(ChannelState::Starting);
        let outcome = self.connect_and_read().await;
        self.clear_outbound();

        if self.inner.cancel.is_cancelled() {
            self.stop(StopReason::Closed);
            return;
        }

        let policy = &self.inner.policy;
        match outcome {
            Ok(SessionEnd::Cancelled) => self.stop(StopReason::Closed),
            Ok(SessionEnd::PeerClosed) => {
                info!(
                    delay_secs = policy.reconnect_delay.as_secs(),
                    "WebSocket disconnected, reconnecting"
                );
                self.set_state(ChannelState::Disconnected);
                self.pause(policy.reconnect_delay).await;
            }
            Err(Failure::Auth(reason)) => {
                error!(%reason, "Credentials rejected by device");
                self.stop(StopReason::AuthorizationFailure);
            }
            Err(Failure::Fatal(reason)) => {
                error!(%reason, "Unexpected WebSocket failure");
                self.stop(StopReason::Unknown);
            }
            Err(Failure::Connection(reason)) => {
                let attempts = self.inner.failed_attempts.load(Ordering::SeqCst);
                if attempts >= policy.max_failed_attempts {
                    error!(attempts, %reason, "WebSocket reconnection limit reached, giving up");
                    self.stop(StopReason::TooManyRetries);
                    return;
                }

                let attempts = attempts + 1;
                self.inner.failed_attempts.store(attempts, Ordering::SeqCst);
                let delay = retry_delay(attempts, policy);
                warn!(
                    %reason,
                    attempt = attempts,
                    delay_secs = delay.as_secs(),
                    "WebSocket connection failed, retrying"
                );
                self.set_state(ChannelState::Disconnected);
                self.pause(delay).await;
            }
        }
    }

    /// Establish a single connection and read until it drops.
    async fn connect_and_read(&self) -> Result<SessionEnd, Failure> {
        let inner = &self.inner;
        // The query string carries the secret: log the host only.
        info!(host = inner.url.host_str().unwrap_or(""), "Connecting to WebSocket");

        let connector = inner.tls.clone().map(Connector::Rustls);
        let connect =
            tokio_tungstenite::connect_async_tls_with_config(inner.url.as_str(), None, false, connector);

        let (ws_stream, _response) = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            result = tokio::time::timeout(inner.policy.handshake_timeout, connect) => match result {
                Err(_) => return Err(Failure::Connection("handshake timed out".into())),
                Ok(Err(e)) => return Err(classify_connect_error(&e)),
                Ok(Ok(pair)) => pair,
            },
        };

        inner.failed_attempts.store(0, Ordering::SeqCst);
        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        *inner.outbound.lock().expect("outbound lock poisoned") = Some(out_tx);
        self.set_state(ChannelState::Connected);
        info!("WebSocket connected");

        for request in [SocketRequest::summary(), SocketRequest::state()] {
            write
                .send(Message::text(request.to_text()))
                .await
                .map_err(|e| Failure::Connection(e.to_string()))?;
        }

        loop {
            tokio::select! {
                biased;
                () = inner.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                }
                outgoing = out_rx.recv() => {
                    // The sender is only dropped by close().
                    let Some(text) = outgoing else {
                        return Ok(SessionEnd::Cancelled);
                    };
                    trace!("Sending WebSocket frame");
                    write
                        .send(Message::text(text))
                        .await
                        .map_err(|e| Failure::Connection(e.to_string()))?;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            let Some(message) = parse_message(text.as_str()) else {
                                continue;
                            };
                            trace!(request_id = %message.request_id, "WebSocket message");
                            tokio::select! {
                                biased;
                                () = inner.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                                sent = inner.inbound_tx.send(message) => {
                                    if sent.is_err() {
                                        debug!("Inbound receiver dropped, discarding message");
                                    }
                                }
                            }
                        }
                        Some(Ok(Message::Ping(_))) => {
                            // tungstenite queues the pong automatically
                            trace!("WebSocket ping");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            if let Some(ref cf) = frame {
                                info!(
                                    code = %cf.code,
                                    reason = %cf.reason,
                                    "WebSocket close frame received"
                                );
                            } else {
                                info!("WebSocket close frame received (no payload)");
                            }
                            return Ok(SessionEnd::PeerClosed);
                        }
                        Some(Err(e)) => return Err(Failure::Connection(e.to_string())),
                        None => {
                            info!("WebSocket stream ended");
                            return Ok(SessionEnd::PeerClosed);
                        }
                        Some(Ok(_)) => {
                            // Binary, Pong, Frame -- ignore
                        }
                    }
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
