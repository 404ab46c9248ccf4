//! The store: registry mutex, wake-up condition and shared configuration.

use std::sync::{Arc, LazyLock};

use parking_lot::{Condvar, Mutex};
use tokio::sync::broadcast;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::events::{EventBus, StoreEvent};
use crate::registry::State;

/// Process-wide registry of native handles.
///
/// Cloning is cheap; clones share the same maps and locks. One mutex
/// guards all registry bookkeeping and lock-state changes, and one
/// condition variable is broadcast whenever a lock is given back or a
/// resource is unlinked.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) state: Mutex<State>,
    pub(crate) wake: Condvar,
    config: StoreConfig,
    events: EventBus,
}

impl Store {
    /// Create a store with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(StoreConfig::default())
    }

    /// Create a store with a validated configuration.
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: StoreConfig) -> Self {
        let events = EventBus::new(config.event_buffer);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                wake: Condvar::new(),
                config,
                events,
            }),
        }
    }

    /// The store's configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Whether two values are clones of the same store.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("resources", &self.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

static GLOBAL: LazyLock<Store> = LazyLock::new(Store::new);

/// The process-wide store, created on first use.
pub fn global() -> &'static Store {
    &GLOBAL
}
