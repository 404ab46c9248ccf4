//! Wrapper objects handed out to the controlling thread.

use std::any::Any;
use std::sync::Arc;

use crate::descriptor::Descriptor;
use crate::dispose::Trigger;
use crate::error::{Error, Result};
use crate::guard::LockSet;
use crate::id::{NativePtr, ResourceId};
use crate::native::{KindFlags, Native};
use crate::store::Store;

/// The shared wrapper behind every clone of a [`Handle`].
///
/// Holds the finalizer's reference to the descriptor. The registry only
/// keeps a weak reference to the wrapper, so once the last `Handle` clone
/// is gone the wrapper is unreachable and its `Drop` runs the
/// garbage-driven disposal path.
pub(crate) struct Wrapper {
    store: Store,
    descriptor: Option<Arc<Descriptor>>,
}

impl Wrapper {
    pub(crate) fn new(store: Store, descriptor: Arc<Descriptor>) -> Self {
        Self {
            store,
            descriptor: Some(descriptor),
        }
    }

    pub(crate) fn descriptor(&self) -> &Arc<Descriptor> {
        self.descriptor
            .as_ref()
            .expect("wrapper used after finalization")
    }
}

impl Drop for Wrapper {
    fn drop(&mut self) {
        if let Some(descriptor) = self.descriptor.take() {
            tracing::trace!(resource_id = %descriptor.id, "Wrapper unreachable, finalizing");
            self.store.retire(descriptor, Trigger::Finalizer);
        }
    }
}

/// Handle to a registered native resource.
///
/// Clones share one wrapper: re-opening the same native pointer returns a
/// handle for which [`Handle::ptr_eq`] holds. Dropping the last clone
/// fires the finalizer; [`Handle::dispose`] is the explicit path. The
/// native teardown runs once both have happened.
#[derive(Clone)]
pub struct Handle {
    wrapper: Arc<Wrapper>,
}

impl Handle {
    pub(crate) fn from_wrapper(wrapper: Arc<Wrapper>) -> Self {
        Self { wrapper }
    }

    fn descriptor(&self) -> &Descriptor {
        self.wrapper.descriptor()
    }

    /// The resource id.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.descriptor().id
    }

    /// The native pointer identity.
    #[must_use]
    pub fn pointer(&self) -> NativePtr {
        self.descriptor().pointer
    }

    /// The parent id, [`ResourceId::NONE`] for a root.
    #[must_use]
    pub fn parent_id(&self) -> ResourceId {
        self.descriptor().parent_id()
    }

    /// Id of the root whose lock guards this resource.
    #[must_use]
    pub fn root_id(&self) -> ResourceId {
        self.descriptor().root_id()
    }

    /// Whether the resource has no parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id().is_none()
    }

    /// Kind tag reported by the native object.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.descriptor().kind()
    }

    /// Flags recorded at registration.
    #[must_use]
    pub fn flags(&self) -> KindFlags {
        self.descriptor().flags
    }

    /// The store this handle is registered in.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.wrapper.store
    }

    /// Whether the resource is still registered (not yet disposed).
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.store().is_alive(self.id())
    }

    /// Explicitly dispose the resource. See [`Store::dispose`].
    pub fn dispose(&self) {
        self.store().dispose(self.id());
    }

    /// Typed access to the native object while its family is locked.
    ///
    /// # Errors
    /// [`Error::UseAfterRelease`] once the resource is disposed,
    /// [`Error::NotLocked`] if `locks` does not cover the family and
    /// [`Error::KindMismatch`] if the native object is not a `T`.
    pub fn native<'a, T: Native>(&'a self, locks: &'a LockSet) -> Result<&'a T> {
        let descriptor = self.descriptor();
        let id = descriptor.id;

        if !self.is_alive() {
            return Err(Error::UseAfterRelease { id });
        }
        if !Store::ptr_eq(locks.store(), self.store()) || !locks.holds(descriptor.root_id()) {
            return Err(Error::NotLocked { id });
        }

        let native: &dyn Any = descriptor.native();
        native.downcast_ref::<T>().ok_or(Error::KindMismatch {
            id,
            expected: std::any::type_name::<T>(),
        })
    }

    /// Whether two handles share the same wrapper.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.wrapper, &b.wrapper)
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id())
            .field("pointer", &self.pointer())
            .field("parent", &self.parent_id())
            .field("kind", &self.kind())
            .finish()
    }
}
