use std::sync::atomic::{AtomicU64, Ordering};

/// Counters tracking session activity.
///
/// All counters are monotonic and lock-free; reads are cheap enough to poll
/// from a status endpoint or a periodic log line.
#[derive(Debug, Default)]
pub struct Metrics {
    connections_total: AtomicU64,
    reconnections_total: AtomicU64,
    messages_received_total: AtomicU64,
    messages_sent_total: AtomicU64,
    parse_failures_total: AtomicU64,
    errors_total: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections: u64,
    pub reconnections: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub parse_failures: u64,
    pub errors: u64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnection(&self) {
        self.reconnections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_received(&self) {
        self.messages_received_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_sent(&self) {
        self.messages_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parse_failure(&self) {
        self.parse_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Successful opens, including those made by the reconnection supervisor
    pub fn connections(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    /// Reconnection attempts started (not necessarily successful)
    pub fn reconnections(&self) -> u64 {
        self.reconnections_total.load(Ordering::Relaxed)
    }

    /// Well-formed envelopes received and dispatched
    pub fn messages_received(&self) -> u64 {
        self.messages_received_total.load(Ordering::Relaxed)
    }

    /// Envelopes handed to the transport
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent_total.load(Ordering::Relaxed)
    }

    /// Inbound frames discarded as malformed
    pub fn parse_failures(&self) -> u64 {
        self.parse_failures_total.load(Ordering::Relaxed)
    }

    /// Transport-level errors observed
    pub fn errors(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }

    /// Copy all counters at once
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections: self.connections(),
            reconnections: self.reconnections(),
            messages_received: self.messages_received(),
            messages_sent: self.messages_sent(),
            parse_failures: self.parse_failures(),
            errors: self.errors(),
        }
    }
}
