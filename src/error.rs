use std::time::Duration;
use thiserror::Error;

/// Errors that can occur on the transport layer.
///
/// These never surface through the facade as exceptions: a failed open or a
/// dropped connection is routed through the reconnection supervisor and
/// logged, and `send()` reports "not connected" via its boolean return.
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Transport could not be constructed or opened
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Connection attempt exceeded the configured timeout
    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),
}
