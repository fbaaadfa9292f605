use crate::config::SessionConfig;
use crate::connection::{Connection, ConnectionCommand, ConnectionState};
use crate::envelope::Envelope;
use crate::metrics::Metrics;
use crate::registry::{ListenerRegistry, Subscription};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

/// Default command channel buffer size
const COMMAND_CHANNEL_SIZE: usize = 100;

/// Manages a single persistent WebSocket session.
///
/// The manager owns exactly one connection, supervises its lifecycle
/// through an explicit state machine, recovers from drops via bounded
/// reconnection with a fixed cooldown, and fans incoming envelopes out to
/// type-keyed subscribers.
///
/// # Thread Safety
///
/// `SessionManager` is `Send + Sync`; all methods can be called from
/// multiple tasks concurrently. Lifecycle operations (`connect`,
/// `disconnect`) are serialized through an internal `tokio::Mutex`.
///
/// # Example
///
/// ```ignore
/// use ws_session_manager::{Envelope, SessionConfig, SessionManager};
///
/// let config = SessionConfig::builder("wss://example.com/realtime").build()?;
/// let manager = SessionManager::new(config);
///
/// let _sub = manager.subscribe("chat.message", |envelope: &Envelope| {
///     println!("chat: {}", envelope.payload);
/// });
///
/// manager.connect().await;
/// ```
pub struct SessionManager {
    config: SessionConfig,
    shared: Arc<Shared>,
    /// Command sender for the live session task, mirrored here so `send()`
    /// stays synchronous
    command_tx: RwLock<Option<mpsc::Sender<ConnectionCommand>>>,
    /// Serializes connect/disconnect to prevent two live session tasks
    lifecycle: Mutex<Option<SessionTask>>,
}

struct SessionTask {
    handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

/// State shared between the facade and the session task
pub(crate) struct Shared {
    state_tx: watch::Sender<ConnectionState>,
    registry: ListenerRegistry,
    last_message: RwLock<Option<Envelope>>,
    /// Consecutive reconnection attempts; reset to 0 only on a successful
    /// open, so it survives manual reconnect cycles
    reconnect_attempts: AtomicU32,
    metrics: Arc<Metrics>,
}

impl Shared {
    fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state_tx,
            registry: ListenerRegistry::default(),
            last_message: RwLock::new(None),
            reconnect_attempts: AtomicU32::new(0),
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Update the connection state and notify watchers
    pub(crate) fn set_state(&self, new_state: ConnectionState) {
        self.state_tx.send_if_modified(|state| {
            if *state == new_state {
                false
            } else {
                info!("session state: {} -> {}", state, new_state);
                *state = new_state;
                true
            }
        });
    }

    /// Route one inbound text frame: parse, retain, dispatch.
    ///
    /// Malformed frames are discarded; they never reach subscribers and
    /// leave the last retained message untouched.
    pub(crate) fn handle_incoming(&self, text: &str) {
        match Envelope::from_text(text) {
            Ok(envelope) => {
                self.metrics.record_message_received();
                *self.last_message.write() = Some(envelope.clone());
                self.registry.dispatch(&envelope);
            }
            Err(e) => {
                self.metrics.record_parse_failure();
                debug!(error = %e, "discarding malformed message");
            }
        }
    }

    pub(crate) fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn bump_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn reset_reconnect_attempts(&self) {
        self.reconnect_attempts.store(0, Ordering::SeqCst);
    }

    pub(crate) fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl SessionManager {
    /// Create a new manager for the configured endpoint.
    ///
    /// No connection is attempted until [`connect`](Self::connect) is called.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::new()),
            command_tx: RwLock::new(None),
            lifecycle: Mutex::new(None),
        }
    }

    /// Start the session.
    ///
    /// Spawns a background task that opens the connection and handles
    /// reconnection automatically. A no-op while an attempt is already in
    /// flight (`Connecting`, `Connected`, or `Reconnecting` with a pending
    /// retry), so at most one live connection attempt exists at a time.
    ///
    /// A manual `connect()` after reconnection attempts are exhausted is
    /// always accepted; the attempt counter resets only when the new
    /// attempt actually succeeds.
    pub async fn connect(&self) {
        let mut lifecycle = self.lifecycle.lock().await;

        if let Some(task) = lifecycle.as_ref() {
            if !task.handle.is_finished() && self.shared.state() != ConnectionState::Disconnected {
                debug!("already connecting or connected, ignoring connect()");
                return;
            }
        }

        // Reap the previous session task before starting a new cycle.
        if let Some(task) = lifecycle.take() {
            task.shutdown.notify_one();
            let _ = task.handle.await;
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let shutdown = Arc::new(Notify::new());
        let connection = Connection::new(
            self.config.clone(),
            self.shared.clone(),
            command_rx,
            shutdown.clone(),
        );
        let handle = tokio::spawn(connection.run());

        *self.command_tx.write() = Some(command_tx);
        *lifecycle = Some(SessionTask { handle, shutdown });
    }

    /// Disconnect the session and cancel any pending reconnection.
    ///
    /// Idempotent: safe to call when already disconnected. Closes the
    /// transport if open and never triggers the reconnection supervisor.
    pub async fn disconnect(&self) {
        let mut lifecycle = self.lifecycle.lock().await;

        *self.command_tx.write() = None;
        if let Some(task) = lifecycle.take() {
            task.shutdown.notify_one();
            let _ = task.handle.await;
            info!("session disconnected");
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Attempt to transmit an envelope.
    ///
    /// Returns `true` on hand-off to the transport, `false` in any
    /// non-`Connected` state. "Not connected" is a routine condition, not
    /// an error; a transport caught mid-close also reports `false`.
    pub fn send(&self, envelope: &Envelope) -> bool {
        if self.shared.state() != ConnectionState::Connected {
            return false;
        }

        let text = match envelope.to_text() {
            Ok(text) => text,
            Err(e) => {
                debug!(error = %e, "failed to serialize envelope");
                return false;
            }
        };

        match self.command_tx.read().as_ref() {
            Some(tx) => tx.try_send(ConnectionCommand::Send(Message::Text(text))).is_ok(),
            None => false,
        }
    }

    /// Register a callback for a message type.
    ///
    /// The returned [`Subscription`] removes exactly this registration when
    /// its `unsubscribe()` is called; each call to `subscribe` is a
    /// distinct entry even for the same callback. Callbacks for one type
    /// run synchronously, each exactly once per matching message, in an
    /// unspecified order.
    pub fn subscribe(
        &self,
        kind: impl Into<String>,
        callback: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.registry.subscribe(kind.into(), callback)
    }

    /// Number of callbacks currently registered for a message type
    pub fn subscriber_count(&self, kind: &str) -> usize {
        self.shared.registry.listener_count(kind)
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Check whether the session is currently connected
    pub fn is_connected(&self) -> bool {
        self.shared.state().is_connected()
    }

    /// Subscribe to connection state changes.
    ///
    /// Returns a receiver that notifies when the connection state changes,
    /// useful for rendering connecting/connected/reconnecting/offline
    /// feedback.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx().subscribe()
    }

    /// The most recent successfully parsed envelope, if any
    pub fn last_message(&self) -> Option<Envelope> {
        self.shared.last_message.read().clone()
    }

    /// Consecutive reconnection attempts since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.reconnect_attempts()
    }

    /// Get the metrics for this session
    pub fn metrics(&self) -> Arc<Metrics> {
        self.shared.metrics.clone()
    }

    fn state_tx(&self) -> &watch::Sender<ConnectionState> {
        &self.shared.state_tx
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        // Abort the session task to prevent it outliving the manager.
        if let Ok(mut lifecycle) = self.lifecycle.try_lock() {
            if let Some(task) = lifecycle.take() {
                task.handle.abort();
            }
        }
    }
}
