//! Disposal coordinator.
//!
//! A resource can be asked to go away twice: explicitly through
//! [`Store::dispose`] and by its wrapper's finalizer when the last
//! [`Handle`](crate::Handle) clone is dropped. Both paths unlink the
//! descriptor (and everything opened from it) from the registry maps,
//! drop their own reference and wake the lock waiters. Neither path calls
//! into the native library directly; the teardown in the descriptor's
//! `Drop` runs when the last reference goes, and that reference is always
//! dropped while the family lock is held.
//!
//! Explicit disposal waits for the family lock. The finalizer runs on
//! whatever thread drops the last handle, possibly one holding another
//! family, so it never waits: if the family is busy the unlinked
//! descriptors are parked and the holder drops them when it releases.

use std::sync::Arc;

use crate::descriptor::Descriptor;
use crate::events::StoreEvent;
use crate::id::ResourceId;
use crate::lock::current_holder;
use crate::store::Store;

/// Which disposal path fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// [`Store::dispose`] or [`Handle::dispose`](crate::Handle::dispose).
    Explicit,
    /// The last wrapper clone was dropped.
    Finalizer,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::Finalizer => write!(f, "finalizer"),
        }
    }
}

impl Store {
    /// Explicitly dispose a resource.
    ///
    /// Waits for in-flight operations on the resource's family, then
    /// removes it (and everything opened from it) from the registry.
    /// Idempotent: unknown or already disposed ids are a no-op, and it may
    /// race freely with the finalizer.
    pub fn dispose(&self, id: ResourceId) {
        if id.is_none() {
            return;
        }
        let descriptor = self.inner.state.lock().get(id).cloned();
        match descriptor {
            Some(descriptor) => self.retire(descriptor, Trigger::Explicit),
            None => tracing::trace!(resource_id = %id, "Dispose of unregistered resource ignored"),
        }
    }

    /// Run one disposal path for `descriptor`, consuming the caller's reference.
    pub(crate) fn retire(&self, descriptor: Arc<Descriptor>, trigger: Trigger) {
        let id = descriptor.id;
        let lock = Arc::clone(&descriptor.lock);
        let holder = current_holder();

        let mut state = self.inner.state.lock();
        let access = loop {
            if lock.is_held_by(holder) {
                break Access::Owned;
            }
            if lock.try_take(holder) {
                break Access::Taken;
            }
            if trigger == Trigger::Finalizer {
                break Access::Busy;
            }
            self.inner.wake.wait(&mut state);
        };

        let mut graveyard = Vec::new();
        let unlinked = state.unlink(id, &mut graveyard);
        graveyard.push(descriptor);
        if access == Access::Busy {
            state.park(lock.root(), graveyard);
            drop(state);
            tracing::trace!(
                resource_id = %id,
                root = %lock.root(),
                "Family busy, teardown deferred to its holder"
            );
            self.announce_disposal(id, trigger, unlinked);
            self.inner.wake.notify_all();
            return;
        }
        drop(state);

        self.announce_disposal(id, trigger, unlinked);

        // Last references go here, dependents first, under the family lock
        // but outside the registry mutex.
        drop(graveyard);

        if access == Access::Taken {
            self.release(&[lock]);
        } else {
            self.inner.wake.notify_all();
        }
    }

    fn announce_disposal(&self, id: ResourceId, trigger: Trigger, unlinked: usize) {
        if unlinked == 0 {
            tracing::trace!(resource_id = %id, %trigger, "Resource already unlinked");
            return;
        }
        tracing::debug!(
            resource_id = %id,
            %trigger,
            cascaded = unlinked - 1,
            "Disposed resource"
        );
        self.events().emit(StoreEvent::Disposed {
            id,
            trigger,
            cascaded: unlinked - 1,
        });
    }
}

/// How a disposal path got hold of the family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// The calling thread already held it.
    Owned,
    /// Taken for the duration of the disposal.
    Taken,
    /// Held by another thread; finalizer only.
    Busy,
}
