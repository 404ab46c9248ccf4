//! Event broadcasting for handle lifecycle observability.
//!
//! Provides [`StoreEvent`] variants emitted by the registry, the lock
//! manager and the disposal coordinator, and an [`EventBus`] backed by
//! `tokio::sync::broadcast`.

use tokio::sync::broadcast;

use crate::dispose::Trigger;
use crate::id::ResourceId;

// ---------------------------------------------------------------------------
// StoreEvent
// ---------------------------------------------------------------------------

/// Events emitted during a resource's life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A native handle was registered.
    Registered {
        /// The new resource id.
        id: ResourceId,
        /// Its parent, [`ResourceId::NONE`] for a root.
        parent: ResourceId,
        /// Kind tag of the native object.
        kind: &'static str,
    },
    /// A disposal path unlinked a resource from the registry.
    Disposed {
        /// The disposed resource id.
        id: ResourceId,
        /// Which path did it.
        trigger: Trigger,
        /// How many descendants were unlinked with it.
        cascaded: usize,
    },
    /// The native teardown ran.
    TornDown {
        /// The resource id.
        id: ResourceId,
        /// Kind tag of the native object.
        kind: &'static str,
    },
    /// A blocking acquire found one of its families busy and started waiting.
    LockContended {
        /// The normalized ids that were requested.
        ids: Vec<ResourceId>,
    },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for store events.
///
/// Emission is fire-and-forget: if no subscribers are listening or the
/// channel is full, events are silently dropped (no backpressure on the
/// emitter, which may be holding the registry mutex).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    ///
    /// # Panics
    /// Panics if `buffer_size` is zero.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: StoreEvent) {
        // An error only means nobody is subscribed.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    ///
    /// A subscriber that falls behind by more than the buffer size gets a
    /// `Lagged` error and skips to the latest event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
