//! One descriptor per live native handle.

use std::sync::{Arc, Weak};

use crate::events::{EventBus, StoreEvent};
use crate::handle::Wrapper;
use crate::id::{NativePtr, ResourceId};
use crate::lock::ExclusiveLock;
use crate::native::{KindFlags, Native};

/// Shared-ownership record of a registered native handle.
///
/// Three holders keep a descriptor alive: the id map entry, the pointer
/// map entry and the wrapper's finalizer. Children additionally hold their
/// parent, so a root always outlives its dependents. The native teardown
/// lives in `Drop` and therefore runs exactly once, when the last holder
/// lets go.
pub(crate) struct Descriptor {
    pub(crate) id: ResourceId,
    pub(crate) pointer: NativePtr,
    pub(crate) parent: Option<Arc<Descriptor>>,
    pub(crate) flags: KindFlags,
    /// The family lock: owned by a root, shared by every dependent.
    pub(crate) lock: Arc<ExclusiveLock>,
    pub(crate) wrapper: Weak<Wrapper>,
    pub(crate) native: Box<dyn Native>,
    pub(crate) events: EventBus,
}

impl Descriptor {
    pub(crate) fn parent_id(&self) -> ResourceId {
        self.parent.as_ref().map_or(ResourceId::NONE, |parent| parent.id)
    }

    pub(crate) fn root_id(&self) -> ResourceId {
        self.lock.root()
    }

    pub(crate) fn kind(&self) -> &'static str {
        self.native.kind()
    }

    pub(crate) fn native(&self) -> &dyn Native {
        self.native.as_ref()
    }
}

impl Drop for Descriptor {
    fn drop(&mut self) {
        let kind = self.native.kind();

        if self.flags.is_transient_result()
            && let Some(parent) = &self.parent
        {
            tracing::debug!(
                resource_id = %self.id,
                parent_id = %parent.id,
                pointer = %self.pointer,
                "Releasing transient result set"
            );
            parent.native.release_result_set(self.pointer);
        }

        self.native.release();

        tracing::debug!(
            resource_id = %self.id,
            kind,
            pointer = %self.pointer,
            "Native handle torn down"
        );
        self.events.emit(StoreEvent::TornDown { id: self.id, kind });
        // `parent` is dropped after this body, so a root's own teardown can
        // only ever follow the teardown of its last dependent.
    }
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("id", &self.id)
            .field("pointer", &self.pointer)
            .field("parent", &self.parent_id())
            .field("root", &self.root_id())
            .field("kind", &self.kind())
            .field("flags", &self.flags)
            .finish()
    }
}
