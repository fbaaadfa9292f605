//! Integration tests driving a [`SessionManager`] against a loopback
//! WebSocket server.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use ws_session_manager::{ConnectionState, Envelope, SessionConfig, SessionManager};

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn test_config(url: &str) -> SessionConfig {
    SessionConfig::builder(url)
        .max_reconnect_attempts(5)
        .reconnect_delay(Duration::from_millis(50))
        .connect_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

async fn wait_for_state(manager: &SessionManager, state: ConnectionState) {
    let mut rx = manager.state_receiver();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {state}"))
        .unwrap();
}

/// Poll until `predicate` holds; panics after five seconds
async fn wait_until(mut predicate: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !predicate() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for condition");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn typed_dispatch_and_malformed_frames() {
    let (listener, url) = bind().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text(
            r#"{"type":"chat.message","payload":{"text":"hi"}}"#.to_string(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text("not-json".to_string())).await.unwrap();
        ws.send(Message::Text(r#"{"payload":{}}"#.to_string()))
            .await
            .unwrap();
        // Keep the socket open until the client hangs up.
        while ws.next().await.is_some() {}
    });

    let manager = SessionManager::new(test_config(&url));
    let a = Arc::new(AtomicUsize::new(0));
    let b = Arc::new(AtomicUsize::new(0));

    let a_count = a.clone();
    let _sub_a = manager.subscribe("chat.message", move |envelope| {
        assert_eq!(envelope.payload["text"], "hi");
        a_count.fetch_add(1, Ordering::SeqCst);
    });
    let b_count = b.clone();
    let _sub_b = manager.subscribe("chat.message", move |_| {
        b_count.fetch_add(1, Ordering::SeqCst);
    });

    manager.connect().await;
    wait_for_state(&manager, ConnectionState::Connected).await;

    let metrics = manager.metrics();
    wait_until(|| metrics.parse_failures() == 2).await;

    // Each subscriber ran exactly once; the malformed frames never reached
    // them and left the retained message untouched.
    assert_eq!(a.load(Ordering::SeqCst), 1);
    assert_eq!(b.load(Ordering::SeqCst), 1);
    let last = manager.last_message().unwrap();
    assert_eq!(last.kind, "chat.message");
    assert_eq!(last.payload["text"], "hi");
    assert_eq!(metrics.messages_received(), 1);

    manager.disconnect().await;
}

#[tokio::test]
async fn unsubscribe_removes_exactly_one_registration() {
    let (listener, url) = bind().await;

    // The server echoes one tick envelope after the client sends anything,
    // so delivery is ordered after the unsubscribe below.
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_text() {
                ws.send(Message::Text(r#"{"type":"tick","payload":1}"#.to_string()))
                    .await
                    .unwrap();
            }
        }
    });

    let manager = SessionManager::new(test_config(&url));
    let kept = Arc::new(AtomicUsize::new(0));
    let removed = Arc::new(AtomicUsize::new(0));

    let kept_count = kept.clone();
    let _kept_sub = manager.subscribe("tick", move |_| {
        kept_count.fetch_add(1, Ordering::SeqCst);
    });
    let removed_count = removed.clone();
    let removed_sub = manager.subscribe("tick", move |_| {
        removed_count.fetch_add(1, Ordering::SeqCst);
    });
    removed_sub.unsubscribe();

    manager.connect().await;
    wait_for_state(&manager, ConnectionState::Connected).await;

    assert!(manager.send(&Envelope::new("trigger", json!(null))));
    wait_until(|| kept.load(Ordering::SeqCst) == 1).await;
    assert_eq!(removed.load(Ordering::SeqCst), 0);

    manager.disconnect().await;
}

#[tokio::test]
async fn reconnects_after_server_drops_live_connection() {
    let (listener, url) = bind().await;

    tokio::spawn(async move {
        // First session is closed by the server as soon as it is up.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();

        // Second session stays up.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let manager = SessionManager::new(test_config(&url));
    manager.connect().await;
    wait_for_state(&manager, ConnectionState::Connected).await;

    // The established connection drops; the supervisor schedules a retry
    // and the session comes back on its own.
    let metrics = manager.metrics();
    wait_until(|| metrics.connections() == 2).await;
    wait_for_state(&manager, ConnectionState::Connected).await;

    assert!(metrics.reconnections() >= 1);
    assert_eq!(manager.reconnect_attempts(), 0);

    manager.disconnect().await;
}

#[tokio::test]
async fn send_is_gated_on_connected_state() {
    let (listener, url) = bind().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let manager = SessionManager::new(test_config(&url));
    let envelope = Envelope::new("chat.message", json!({"text": "hello"}));

    // Offline: refused, not an error.
    assert!(!manager.send(&envelope));

    manager.connect().await;
    wait_for_state(&manager, ConnectionState::Connected).await;
    assert!(manager.send(&envelope));

    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!manager.send(&envelope));
}

#[tokio::test]
async fn reconnect_attempts_exhaust_then_manual_connect_resets_on_success() {
    let (listener, url) = bind().await;
    let accepting = Arc::new(AtomicBool::new(false));

    let gate = accepting.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            if !gate.load(Ordering::SeqCst) {
                // Refuse the handshake so the open attempt fails.
                drop(stream);
                continue;
            }
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                while ws.next().await.is_some() {}
            });
        }
    });

    let config = SessionConfig::builder(&url)
        .max_reconnect_attempts(2)
        .reconnect_delay(Duration::from_millis(50))
        .connect_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let manager = SessionManager::new(config);

    manager.connect().await;
    wait_until(|| {
        manager.reconnect_attempts() == 2 && manager.state() == ConnectionState::Disconnected
    })
    .await;

    // The budget is spent; the session stays down until asked again.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(manager.reconnect_attempts(), 2);

    // A manual connect() is always honored, and only a successful open
    // clears the counter.
    accepting.store(true, Ordering::SeqCst);
    manager.connect().await;
    wait_for_state(&manager, ConnectionState::Connected).await;
    assert_eq!(manager.reconnect_attempts(), 0);

    manager.disconnect().await;
}

#[tokio::test]
async fn disconnect_cancels_pending_retry() {
    // Bind then drop so the port refuses connections immediately.
    let (listener, url) = bind().await;
    drop(listener);

    let config = SessionConfig::builder(&url)
        .max_reconnect_attempts(5)
        .reconnect_delay(Duration::from_secs(5))
        .connect_timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let manager = SessionManager::new(config);

    manager.connect().await;
    wait_for_state(&manager, ConnectionState::Reconnecting).await;
    assert_eq!(manager.reconnect_attempts(), 1);

    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    // The cancelled retry never fires.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(manager.reconnect_attempts(), 1);
}

#[tokio::test]
async fn redundant_connect_is_a_noop() {
    let (listener, url) = bind().await;
    let accepts = Arc::new(AtomicUsize::new(0));

    let count = accepts.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            count.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut ws = accept_async(stream).await.unwrap();
                while ws.next().await.is_some() {}
            });
        }
    });

    let manager = SessionManager::new(test_config(&url));
    manager.connect().await;
    wait_for_state(&manager, ConnectionState::Connected).await;

    manager.connect().await;
    manager.connect().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(accepts.load(Ordering::SeqCst), 1);
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.disconnect().await;
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let (_listener, url) = bind().await;
    let manager = SessionManager::new(test_config(&url));

    manager.disconnect().await;
    manager.disconnect().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}
