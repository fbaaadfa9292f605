//! # ws-session-manager
//!
//! A resilient client for a single persistent WebSocket session with
//! auto-reconnection and type-keyed message dispatch.
//!
//! ## Features
//!
//! - **Explicit state machine** - disconnected / connecting / connected /
//!   reconnecting, observable through a watch channel
//! - **Auto-reconnection** with a fixed cooldown and a bounded attempt
//!   budget; manual `connect()` always works after the budget is spent
//! - **Typed fan-out** - subscribers register per message type and receive
//!   each matching envelope exactly once
//! - **Non-throwing send** - `send()` reports delivery eligibility as a
//!   boolean instead of erroring while offline
//! - **Metrics** for observability
//!
//! ## Example
//!
//! ```ignore
//! use ws_session_manager::{Envelope, SessionConfig, SessionManager};
//!
//! let config = SessionConfig::builder("wss://example.com/realtime")
//!     .max_reconnect_attempts(5)
//!     .build()?;
//!
//! let manager = SessionManager::new(config);
//! let _sub = manager.subscribe("chat.message", |envelope: &Envelope| {
//!     println!("chat: {}", envelope.payload);
//! });
//!
//! manager.connect().await;
//! ```

mod config;
mod connection;
mod envelope;
mod error;
mod manager;
mod metrics;
mod registry;

pub use config::{ConfigError, SessionConfig, SessionConfigBuilder};
pub use connection::ConnectionState;
pub use envelope::Envelope;
pub use manager::SessionManager;
pub use metrics::{Metrics, MetricsSnapshot};
pub use registry::Subscription;
