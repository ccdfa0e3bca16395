//! Persistent WebSocket session to the chat relay.
//!
//! A [`ConnectionManager`] owns exactly one relay session for one chat view.
//! It opens the socket, keeps it alive with a fixed-interval reconnect
//! policy, and turns every socket-level happening into a typed
//! [`ConnectionEvent`] pushed onto an ordered channel. Whoever owns the UI
//! drains that channel on its own schedule; nothing in here touches display
//! state.
//!
//! # Architecture
//!
//! ```text
//! caller ── connect/send/close ──> ConnectionManager
//!                                     │  Command (unbounded mpsc)
//!                                     v
//!                              session task (one per manager)
//!                                     │  ConnectionEvent (bounded mpsc, FIFO)
//!                                     v
//!                              UI-owned receiver
//! ```
//!
//! The session task is the only place the socket lives. `send` hands it a
//! frame and waits for the write result; `close` asks it to send a close
//! frame. Connection state is published through a `watch` channel that only
//! this module writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use relaychat_proto::codec::{self, CodecError};
use relaychat_proto::envelope::{InboundEnvelope, OutboundEnvelope};

/// A connected relay socket.
type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Relay address used when nothing is configured.
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:8000";

/// How long `connect` waits for the socket to open.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between an unexpected disconnect and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Reconnect attempts allowed between two successful opens.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default capacity of the notification channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Error text emitted when `send` is called without an open socket.
pub const NOT_CONNECTED: &str = "Not connected to server";

/// Error text emitted when the relay sends a frame that is not an envelope.
pub const INVALID_RESPONSE: &str = "Invalid response format from server";

/// Lifecycle of the relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket, and none being opened.
    Disconnected,
    /// A socket is being opened.
    Connecting,
    /// The socket is open and writable.
    Connected,
}

impl ConnectionState {
    /// Lowercase name used in status notifications.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications published by a [`ConnectionManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The session moved to a new state.
    StatusChanged {
        /// The new state.
        status: ConnectionState,
        /// Human-readable description, suitable for a tooltip.
        detail: String,
    },
    /// The relay sent a well-formed envelope. Not interpreted here.
    MessageReceived(InboundEnvelope),
    /// A transport or protocol fault. The session may still be usable.
    ErrorOccurred(String),
}

/// Tunables for one relay session.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// WebSocket URL of the relay (`ws://` or `wss://`).
    pub relay_url: String,
    /// How long `connect` waits for the socket to open.
    pub connect_timeout: Duration,
    /// Fixed pause before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Reconnect attempts allowed between two successful opens.
    pub max_reconnect_attempts: u32,
    /// Capacity of the notification channel.
    pub event_buffer: usize,
}

impl ConnectionSettings {
    /// Settings for `relay_url` with every other field at its default.
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            ..Self::default()
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Faults inside the session. Never returned to callers; every one of
/// them ends up as a [`ConnectionEvent::ErrorOccurred`].
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Opening the socket or writing a frame took too long.
    #[error("relay operation timed out")]
    Timeout,

    /// The session task went away before the operation completed.
    #[error("connection closed")]
    Closed,

    /// The WebSocket layer failed.
    #[error("{0}")]
    WebSocket(#[from] tungstenite::Error),

    /// A frame could not be encoded.
    #[error("{0}")]
    Codec(#[from] CodecError),
}

/// Requests from the manager to its session task.
enum Command {
    /// Write one text frame and report the outcome.
    Send {
        frame: String,
        reply: oneshot::Sender<Result<(), ConnectionError>>,
    },
    /// Send a close frame and stop reading.
    Close,
}

/// State shared between the manager handle and its session task.
struct Shared {
    local_identity: String,
    settings: ConnectionSettings,
    state: watch::Sender<ConnectionState>,
    /// Cleared by `close`; disables reconnection.
    keep_running: AtomicBool,
    reconnect_attempts: AtomicU32,
    remote_identity: Mutex<Option<String>>,
    /// The transport handle. `Some` only while the socket is open.
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    events: mpsc::Sender<ConnectionEvent>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn keep_running(&self) -> bool {
        self.keep_running.load(Ordering::SeqCst)
    }

    /// Publish from the session task, preserving order under backpressure.
    async fn emit(&self, event: ConnectionEvent) {
        // A dropped receiver means the chat view is gone; nothing to tell.
        let _ = self.events.send(event).await;
    }

    /// Publish from a caller's context without waiting on the consumer.
    fn try_emit(&self, event: ConnectionEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.events.try_send(event) {
            tracing::warn!(?event, "notification channel full, dropping event");
        }
    }

    async fn emit_status(&self, status: ConnectionState, detail: &str) {
        self.emit(ConnectionEvent::StatusChanged {
            status,
            detail: detail.to_string(),
        })
        .await;
    }

    /// Publish a freshly opened socket. Returns `false` if the session was
    /// closed while the socket was being opened.
    fn on_open(&self, commands: mpsc::UnboundedSender<Command>) -> bool {
        // `close` clears the flag under this lock, so a close either sees
        // the handle or stops it from being published.
        let mut slot = self.commands.lock();
        if !self.keep_running() {
            return false;
        }
        // Handle before state: `send` never sees `Connected` without a way
        // to write.
        *slot = Some(commands);
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);
        drop(slot);
        tracing::info!(
            url = %self.settings.relay_url,
            local = %self.local_identity,
            "relay connection opened"
        );
        true
    }

    async fn on_close(&self) {
        self.commands.lock().take();
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(url = %self.settings.relay_url, "relay connection closed");
        self.emit_status(ConnectionState::Disconnected, "Disconnected from server")
            .await;
    }

    /// Decide whether to reconnect, consuming one attempt if so.
    fn should_reconnect(&self) -> bool {
        if !self.keep_running() {
            return false;
        }
        let attempts = self.reconnect_attempts.load(Ordering::SeqCst);
        let max = self.settings.max_reconnect_attempts;
        if attempts >= max {
            tracing::info!(max, "reconnect attempts exhausted, giving up");
            return false;
        }
        self.reconnect_attempts.store(attempts + 1, Ordering::SeqCst);
        tracing::info!(attempt = attempts + 1, max, "attempting to reconnect");
        true
    }

    async fn dispatch_frame(&self, decoded: Result<InboundEnvelope, CodecError>) {
        match decoded {
            Ok(envelope) => {
                tracing::debug!(status = ?envelope.status, "relay frame received");
                self.emit(ConnectionEvent::MessageReceived(envelope)).await;
            }
            Err(e) => {
                tracing::warn!(err = %e, "malformed relay frame, dropping");
                self.emit(ConnectionEvent::ErrorOccurred(INVALID_RESPONSE.to_string()))
                    .await;
            }
        }
    }
}

/// One relay session for one chat view.
///
/// Created with [`ConnectionManager::new`], which also returns the
/// receiving end of the notification channel. Dropping the manager closes
/// the session.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Creates a disconnected session for `local_identity`.
    ///
    /// Returns the manager and the receiver for its [`ConnectionEvent`]s.
    pub fn new(
        settings: ConnectionSettings,
        local_identity: impl Into<String>,
    ) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (events, event_rx) = mpsc::channel(settings.event_buffer.max(1));
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            local_identity: local_identity.into(),
            settings,
            state,
            keep_running: AtomicBool::new(true),
            reconnect_attempts: AtomicU32::new(0),
            remote_identity: Mutex::new(None),
            commands: Mutex::new(None),
            events,
        });
        let manager = Self {
            shared,
            task: Mutex::new(None),
        };
        (manager, event_rx)
    }

    /// Open the session, waiting up to the configured connect timeout.
    ///
    /// Returns `true` at once, without opening another socket, if the
    /// session is already connected. Otherwise emits a `connecting` status,
    /// starts the session task unless a live one is still running, and
    /// reports whether the socket opened in time. A timeout is not fatal:
    /// the task keeps trying under the reconnect policy.
    ///
    /// After [`close`](Self::close), the old task is given up to the connect
    /// timeout to wind down before a fresh one starts.
    pub async fn connect(&self, remote_identity: Option<&str>) -> bool {
        if self.state() == ConnectionState::Connected {
            return true;
        }

        *self.shared.remote_identity.lock() = remote_identity.map(str::to_owned);

        let previous = self.task.lock().take();
        let running = match previous {
            Some(handle) if !handle.is_finished() && self.shared.keep_running() => Some(handle),
            Some(mut handle) if !handle.is_finished() => {
                tracing::debug!("waiting for the closed session task to exit");
                let wait = tokio::time::timeout(self.shared.settings.connect_timeout, &mut handle);
                if wait.await.is_err() {
                    tracing::warn!("closed session task did not exit, aborting it");
                    handle.abort();
                }
                None
            }
            _ => None,
        };

        self.shared.keep_running.store(true, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Connecting);
        self.shared.try_emit(ConnectionEvent::StatusChanged {
            status: ConnectionState::Connecting,
            detail: "Connecting to server...".to_string(),
        });
        let handle = if let Some(handle) = running {
            tracing::debug!("session task already running, waiting for it");
            handle
        } else {
            tracing::info!(url = %self.shared.settings.relay_url, "connecting to relay");
            tokio::spawn(run_session(Arc::clone(&self.shared)))
        };
        *self.task.lock() = Some(handle);

        let mut state_rx = self.shared.state.subscribe();
        let connected = matches!(
            tokio::time::timeout(
                self.shared.settings.connect_timeout,
                state_rx.wait_for(|state| *state == ConnectionState::Connected),
            )
            .await,
            Ok(Ok(_))
        );
        if !connected {
            tracing::warn!(
                url = %self.shared.settings.relay_url,
                timeout = ?self.shared.settings.connect_timeout,
                "relay did not open in time"
            );
            let finished = self
                .task
                .lock()
                .as_ref()
                .is_none_or(JoinHandle::is_finished);
            if finished && self.state() == ConnectionState::Connecting {
                self.shared.set_state(ConnectionState::Disconnected);
            }
        }
        connected
    }

    /// Send `message` to `receiver` through the relay.
    ///
    /// Returns `false` and emits [`NOT_CONNECTED`] if the session is not
    /// open. Write failures are reported as
    /// [`ConnectionEvent::ErrorOccurred`] and also return `false`.
    pub async fn send(&self, receiver: &str, message: &str) -> bool {
        let commands = if self.state() == ConnectionState::Connected {
            self.shared.commands.lock().clone()
        } else {
            None
        };
        let Some(commands) = commands else {
            tracing::warn!(receiver, "cannot send message, not connected to relay");
            self.shared
                .try_emit(ConnectionEvent::ErrorOccurred(NOT_CONNECTED.to_string()));
            return false;
        };

        let envelope = OutboundEnvelope::new(&self.shared.local_identity, receiver, message);
        let result = match codec::encode(&envelope) {
            Ok(frame) => self.write(&commands, frame).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                tracing::debug!(receiver, "message handed to relay");
                true
            }
            Err(e) => {
                tracing::warn!(receiver, err = %e, "relay send failed");
                self.shared.try_emit(ConnectionEvent::ErrorOccurred(format!(
                    "Error sending message: {e}"
                )));
                false
            }
        }
    }

    /// Close the session and disable reconnection.
    ///
    /// Idempotent and non-blocking. The session task finishes on its own
    /// once the socket reports closure.
    pub fn close(&self) {
        let commands = {
            let mut slot = self.shared.commands.lock();
            self.shared.keep_running.store(false, Ordering::SeqCst);
            slot.take()
        };
        if let Some(commands) = commands {
            tracing::info!("closing relay session");
            let _ = commands.send(Command::Close);
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Watch receiver for state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Identity this session sends as.
    #[must_use]
    pub fn local_identity(&self) -> &str {
        &self.shared.local_identity
    }

    /// Peer recorded by the last `connect` call.
    #[must_use]
    pub fn remote_identity(&self) -> Option<String> {
        self.shared.remote_identity.lock().clone()
    }

    /// Reconnect attempts used since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Settings this session was created with.
    #[must_use]
    pub fn settings(&self) -> &ConnectionSettings {
        &self.shared.settings
    }

    /// Hand `frame` to the session task and wait for the write result.
    ///
    /// The wait is bounded by the connect timeout. A frame whose caller has
    /// stopped waiting is skipped by the task instead of written late.
    async fn write(
        &self,
        commands: &mpsc::UnboundedSender<Command>,
        frame: String,
    ) -> Result<(), ConnectionError> {
        let (reply, reply_rx) = oneshot::channel();
        commands
            .send(Command::Send { frame, reply })
            .map_err(|_| ConnectionError::Closed)?;
        tokio::time::timeout(self.shared.settings.connect_timeout, reply_rx)
            .await
            .map_err(|_| ConnectionError::Timeout)?
            .map_err(|_| ConnectionError::Closed)?
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Body of the session task: open, read until closed, maybe reconnect.
async fn run_session(shared: Arc<Shared>) {
    loop {
        match open_socket(&shared.settings).await {
            Ok(mut ws) => {
                let (commands, command_rx) = mpsc::unbounded_channel();
                if shared.on_open(commands) {
                    shared
                        .emit_status(ConnectionState::Connected, "Connected to server")
                        .await;
                    drive(&shared, ws, command_rx).await;
                } else {
                    tracing::debug!("session closed while connecting, dropping socket");
                    let _ = ws.close(None).await;
                }
            }
            Err(e) => {
                tracing::warn!(url = %shared.settings.relay_url, err = %e, "relay connect failed");
                shared
                    .emit(ConnectionEvent::ErrorOccurred(e.to_string()))
                    .await;
            }
        }

        shared.on_close().await;

        if !shared.should_reconnect() {
            break;
        }
        tokio::time::sleep(shared.settings.reconnect_delay).await;
        if !shared.keep_running() {
            tracing::debug!("session closed during reconnect delay");
            break;
        }
        shared.set_state(ConnectionState::Connecting);
        shared
            .emit_status(ConnectionState::Connecting, "Connecting to server...")
            .await;
    }
    tracing::debug!("relay session task exiting");
}

async fn open_socket(settings: &ConnectionSettings) -> Result<WsStream, ConnectionError> {
    let (ws, _response) = tokio::time::timeout(
        settings.connect_timeout,
        connect_async(settings.relay_url.as_str()),
    )
    .await
    .map_err(|_| ConnectionError::Timeout)??;
    Ok(ws)
}

/// Pump one open socket until it closes or the manager asks to close.
async fn drive(
    shared: &Shared,
    ws: WsStream,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    shared.dispatch_frame(codec::decode(text.as_str())).await;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    shared.dispatch_frame(codec::decode_bytes(&bytes)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "relay closed the connection");
                    break;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => {
                    tracing::warn!(err = %e, "relay read error");
                    shared.emit(ConnectionEvent::ErrorOccurred(e.to_string())).await;
                    break;
                }
                None => break,
            },
            command = commands.recv() => match command {
                Some(Command::Send { reply, .. }) if reply.is_closed() => {
                    tracing::debug!("sender stopped waiting, skipping frame");
                }
                Some(Command::Send { frame, reply }) => {
                    let result = sink
                        .send(Message::Text(frame.into()))
                        .await
                        .map_err(ConnectionError::from);
                    let _ = reply.send(result);
                }
                Some(Command::Close) | None => {
                    let _ = sink.close().await;
                    break;
                }
            },
        }
    }
}
