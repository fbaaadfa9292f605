use crate::envelope::Envelope;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

type Callback = Arc<dyn Fn(&Envelope) + Send + Sync>;

struct Entry {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct RegistryInner {
    /// Monotonically increasing counter so every registration has a
    /// distinct identity, even for the same callback under the same type
    next_id: AtomicU64,
    listeners: RwLock<HashMap<String, Vec<Entry>>>,
}

/// Maps message-type keys to sets of subscriber callbacks.
///
/// Entries are created lazily on first subscription to a type; a vector
/// left empty after all unsubscribes is retained, which is not an error.
#[derive(Clone, Default)]
pub(crate) struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl ListenerRegistry {
    /// Register a callback under a message type
    pub(crate) fn subscribe(
        &self,
        kind: String,
        callback: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .write()
            .entry(kind.clone())
            .or_default()
            .push(Entry {
                id,
                callback: Arc::new(callback),
            });
        trace!(%kind, id, "listener registered");
        Subscription {
            inner: self.inner.clone(),
            kind,
            id,
        }
    }

    /// Invoke every callback registered for the envelope's type.
    ///
    /// The callback set is snapshotted before invocation, so a callback
    /// unsubscribing itself or a sibling during dispatch does not affect
    /// the current delivery, only subsequent messages.
    pub(crate) fn dispatch(&self, envelope: &Envelope) {
        let snapshot: Vec<Callback> = {
            let listeners = self.inner.listeners.read();
            match listeners.get(&envelope.kind) {
                Some(entries) => entries.iter().map(|e| e.callback.clone()).collect(),
                None => return, // unknown type: no subscribers, not an error
            }
        };

        trace!(kind = %envelope.kind, listeners = snapshot.len(), "dispatching message");
        for callback in snapshot {
            callback(envelope);
        }
    }

    /// Number of callbacks currently registered for a type
    pub(crate) fn listener_count(&self, kind: &str) -> usize {
        self.inner
            .listeners
            .read()
            .get(kind)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }
}

/// Handle returned from [`SessionManager::subscribe`](crate::SessionManager::subscribe).
///
/// Calling [`unsubscribe`](Self::unsubscribe) removes exactly the
/// registration that produced this handle, even if the same callback is
/// registered under multiple types or multiple times. Dropping the handle
/// without calling it leaves the callback registered.
pub struct Subscription {
    inner: Arc<RegistryInner>,
    kind: String,
    id: u64,
}

impl Subscription {
    /// Remove this registration from the registry
    pub fn unsubscribe(self) {
        let mut listeners = self.inner.listeners.write();
        if let Some(entries) = listeners.get_mut(&self.kind) {
            entries.retain(|e| e.id != self.id);
        }
        trace!(kind = %self.kind, id = self.id, "listener removed");
    }

    /// The message type this subscription is registered under
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}
