use crate::config::SessionConfig;
use crate::error::Error;
use crate::manager::Shared;
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpSocket;
use tokio::sync::{mpsc, Notify};
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::{
    client_async_tls_with_config, tungstenite::client::IntoClientRequest, tungstenite::Message,
    Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

/// Commands that can be sent to a running session task
#[derive(Debug)]
pub(crate) enum ConnectionCommand {
    /// Hand a message to the transport
    Send(Message),
}

/// Lifecycle states of the managed connection.
///
/// Exactly one state is active at any instant; it is the single source of
/// truth for whether a live connection attempt is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and no attempt pending
    Disconnected,
    /// Attempting to open the transport
    Connecting,
    /// Transport is open and messages flow
    Connected,
    /// Dropped; a retry is scheduled after the cooldown
    Reconnecting,
}

impl ConnectionState {
    /// Check if the connection is currently active
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Why the drive loop for an open socket ended
enum DriveOutcome {
    /// Graceful shutdown was requested; do not reconnect
    Shutdown,
    /// The transport dropped the connection; run one supervisor pass
    Dropped,
}

/// Owns one socket and supervises its lifecycle until shutdown or until
/// reconnection attempts are exhausted
pub(crate) struct Connection {
    config: SessionConfig,
    shared: Arc<Shared>,
    command_rx: mpsc::Receiver<ConnectionCommand>,
    shutdown: Arc<Notify>,
}

impl Connection {
    pub(crate) fn new(
        config: SessionConfig,
        shared: Arc<Shared>,
        command_rx: mpsc::Receiver<ConnectionCommand>,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            config,
            shared,
            command_rx,
            shutdown,
        }
    }

    /// Run the connect/supervise loop.
    ///
    /// Each iteration makes exactly one connection attempt. A successful
    /// open resets the attempt counter; a failed open or a drop runs one
    /// supervisor pass, which either schedules a single delayed retry or,
    /// once the counter reaches the configured maximum, leaves the session
    /// `Disconnected` until a manual `connect()`.
    pub(crate) async fn run(mut self) {
        loop {
            self.shared.set_state(ConnectionState::Connecting);
            debug!(url = %self.config.target_url, "connecting");

            let result: Result<WsStream, Error> = tokio::select! {
                res = timeout(
                    self.config.connect_timeout,
                    open_stream(&self.config.target_url),
                ) => match res {
                    Ok(inner) => inner,
                    Err(_) => Err(Error::ConnectTimeout(self.config.connect_timeout)),
                },
                _ = self.shutdown.notified() => {
                    debug!("shutdown requested while connecting");
                    self.shared.set_state(ConnectionState::Disconnected);
                    return;
                }
            };

            match result {
                Ok(ws) => {
                    // A verified successful open is the only thing that
                    // resets the attempt counter.
                    self.shared.reset_reconnect_attempts();
                    self.shared.metrics().record_connection();
                    info!(url = %self.config.target_url, "connected");
                    self.shared.set_state(ConnectionState::Connected);

                    match self.drive(ws).await {
                        DriveOutcome::Shutdown => {
                            self.shared.set_state(ConnectionState::Disconnected);
                            return;
                        }
                        DriveOutcome::Dropped => {}
                    }
                }
                Err(e) => {
                    // Logged only; the transition below is driven by the
                    // drop itself, so a single failure is never counted twice.
                    self.shared.metrics().record_error();
                    warn!(error = %e, "connection attempt failed");
                }
            }

            // Supervisor: exactly one pass per drop.
            self.shared.set_state(ConnectionState::Disconnected);
            let attempts = self.shared.reconnect_attempts();
            if attempts >= self.config.max_reconnect_attempts {
                warn!(
                    attempts,
                    "reconnect attempts exhausted, manual connect() required"
                );
                return;
            }

            self.shared.bump_reconnect_attempts();
            self.shared.metrics().record_reconnection();
            self.shared.set_state(ConnectionState::Reconnecting);
            debug!(
                attempt = attempts + 1,
                delay = ?self.config.reconnect_delay,
                "reconnecting after cooldown"
            );

            tokio::select! {
                _ = sleep(self.config.reconnect_delay) => {}
                _ = self.shutdown.notified() => {
                    debug!("shutdown requested while waiting to reconnect");
                    self.shared.set_state(ConnectionState::Disconnected);
                    return;
                }
            }
        }
    }

    /// Pump an open socket until it drops or shutdown is requested
    async fn drive(&mut self, ws: WsStream) -> DriveOutcome {
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        self.shared.handle_incoming(&text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(error = %e, "failed to answer ping");
                            return DriveOutcome::Dropped;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "server closed the connection");
                        return DriveOutcome::Dropped;
                    }
                    Some(Ok(_)) => {
                        // Binary frames and stray pongs are ignored.
                    }
                    Some(Err(e)) => {
                        self.shared.metrics().record_error();
                        warn!(error = %e, "websocket error");
                        return DriveOutcome::Dropped;
                    }
                    None => {
                        info!("websocket stream ended");
                        return DriveOutcome::Dropped;
                    }
                },
                cmd = self.command_rx.recv() => match cmd {
                    Some(ConnectionCommand::Send(msg)) => {
                        if let Err(e) = write.send(msg).await {
                            warn!(error = %e, "failed to send message");
                            return DriveOutcome::Dropped;
                        }
                        self.shared.metrics().record_message_sent();
                    }
                    None => {
                        // Manager is gone; close out gracefully.
                        let _ = write.send(Message::Close(None)).await;
                        return DriveOutcome::Shutdown;
                    }
                },
                _ = self.shutdown.notified() => {
                    let _ = write.send(Message::Close(None)).await;
                    return DriveOutcome::Shutdown;
                }
            }
        }
    }
}

/// Type alias for WebSocket stream
type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Open a WebSocket connection to the target URL
async fn open_stream(target: &str) -> Result<WsStream, Error> {
    let parsed = Url::parse(target).map_err(|e| Error::Connect(format!("invalid URL: {e}")))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Connect("no host in URL".to_string()))?;
    let is_tls = parsed.scheme() == "wss";
    let port = parsed.port().unwrap_or(if is_tls { 443 } else { 80 });

    let request = target
        .into_client_request()
        .map_err(|e| Error::Connect(format!("invalid WebSocket request: {e}")))?;

    let tcp_stream = connect_tcp(host, port).await?;
    set_tcp_options(&tcp_stream);

    // TLS connector (if needed)
    let connector = if is_tls {
        let tls = native_tls::TlsConnector::new()
            .map_err(|e| Error::Connect(format!("TLS error: {e}")))?;
        Some(Connector::NativeTls(tls))
    } else {
        None
    };

    // WebSocket handshake
    let (ws_stream, _response) = client_async_tls_with_config(request, tcp_stream, None, connector)
        .await
        .map_err(Error::WebSocket)?;

    Ok(ws_stream)
}

/// Establish the underlying TCP connection
async fn connect_tcp(host: &str, port: u16) -> Result<tokio::net::TcpStream, Error> {
    // DNS lookup
    let dest_str = format!("{host}:{port}");
    let dest_addr: SocketAddr = tokio::net::lookup_host(&dest_str)
        .await
        .map_err(|e| Error::Connect(format!("DNS lookup failed: {e}")))?
        .next()
        .ok_or_else(|| Error::Connect(format!("no addresses found for {host}")))?;

    let socket = if dest_addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|e| Error::Connect(format!("failed to create socket: {e}")))?;

    socket
        .connect(dest_addr)
        .await
        .map_err(|e| Error::Connect(format!("TCP connect to {dest_addr} failed: {e}")))
}

/// Set TCP options for low latency
fn set_tcp_options(stream: &tokio::net::TcpStream) {
    let sock2 = socket2::SockRef::from(stream);

    // Disable Nagle's algorithm
    let _ = sock2.set_nodelay(true);

    // Keepalive to detect dead connections
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(30))
        .with_interval(Duration::from_secs(10));
    let _ = sock2.set_tcp_keepalive(&keepalive);
}
