//! Example: a minimal chat client on top of ws-session-manager
//!
//! Connects to a WebSocket chat endpoint, prints incoming chat messages,
//! sends one greeting, and reports session metrics on exit.
//!
//! Run with: cargo run --example chat -- ws://localhost:9000

use serde_json::json;
use std::time::Duration;
use tracing::{info, warn, Level};
use ws_session_manager::{Envelope, SessionConfig, SessionManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:9000".to_string());

    let config = SessionConfig::builder(&url)
        .max_reconnect_attempts(5)
        .reconnect_delay(Duration::from_secs(3))
        .build()?;

    let manager = SessionManager::new(config);

    let _chat = manager.subscribe("chat.message", |envelope: &Envelope| {
        info!(
            "<{}> {}",
            envelope.payload["from"].as_str().unwrap_or("?"),
            envelope.payload["text"].as_str().unwrap_or("")
        );
    });
    let _presence = manager.subscribe("presence", |envelope: &Envelope| {
        info!("presence update: {}", envelope.payload);
    });

    // Log state transitions as they happen.
    let mut state_rx = manager.state_receiver();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            info!("state changed to {}", *state_rx.borrow());
        }
    });

    manager.connect().await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let hello = Envelope::new("chat.message", json!({"from": "demo", "text": "hello"}));
    if !manager.send(&hello) {
        warn!("not connected, greeting dropped");
    }

    // Let the session run for a bit before shutting down.
    tokio::time::sleep(Duration::from_secs(10)).await;
    manager.disconnect().await;

    let snapshot = manager.metrics().snapshot();
    info!(
        "session finished: {} connections, {} reconnections, {} received, {} sent, {} malformed",
        snapshot.connections,
        snapshot.reconnections,
        snapshot.messages_received,
        snapshot.messages_sent,
        snapshot.parse_failures
    );

    Ok(())
}
