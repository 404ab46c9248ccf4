//! Resource registry: the two lookup maps and registration.

use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::events::StoreEvent;
use crate::handle::{Handle, Wrapper};
use crate::hierarchy::Hierarchy;
use crate::id::{NativePtr, ResourceId};
use crate::lock::ExclusiveLock;
use crate::native::{KindFlags, Native};
use crate::store::Store;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything guarded by the registry mutex.
///
/// Critical sections only touch these maps; no native call ever runs
/// while the mutex is held.
#[derive(Debug, Default)]
pub(crate) struct State {
    last_id: u64,
    by_id: HashMap<ResourceId, Arc<Descriptor>>,
    by_pointer: HashMap<NativePtr, Arc<Descriptor>>,
    hierarchy: Hierarchy,
    /// Unlinked descriptors waiting for their family's holder, by root id.
    parked: HashMap<ResourceId, Vec<Arc<Descriptor>>>,
}

impl State {
    pub(crate) fn get(&self, id: ResourceId) -> Option<&Arc<Descriptor>> {
        self.by_id.get(&id)
    }

    /// Remove `id` and, depth first, everything opened from it.
    ///
    /// The removed map entries are pushed to `graveyard` so the caller can
    /// drop them once the mutex is released. Returns how many descriptors
    /// were unlinked; zero means `id` was already gone.
    pub(crate) fn unlink(&mut self, id: ResourceId, graveyard: &mut Vec<Arc<Descriptor>>) -> usize {
        if !self.by_id.contains_key(&id) {
            return 0;
        }

        let mut unlinked = 0;
        for child in self.hierarchy.take_children(id).into_iter().rev() {
            unlinked += self.unlink(child, graveyard);
        }

        let Some(descriptor) = self.by_id.remove(&id) else {
            return unlinked;
        };
        if let Some(entry) = self.by_pointer.remove(&descriptor.pointer) {
            graveyard.push(entry);
        }
        self.hierarchy.detach(descriptor.parent_id(), id);
        graveyard.push(descriptor);

        unlinked + 1
    }

    /// Hand unlinked descriptors to whoever holds the family of `root`.
    pub(crate) fn park(&mut self, root: ResourceId, descriptors: Vec<Arc<Descriptor>>) {
        self.parked.entry(root).or_default().extend(descriptors);
    }

    pub(crate) fn take_parked(&mut self, root: ResourceId) -> Vec<Arc<Descriptor>> {
        self.parked.remove(&root).unwrap_or_default()
    }

    /// Whether `pointer` is unlinked but its teardown has not run yet.
    fn is_parked(&self, pointer: NativePtr) -> bool {
        self.parked
            .values()
            .flatten()
            .any(|descriptor| descriptor.pointer == pointer)
    }

    fn insert(
        &mut self,
        store: &Store,
        pointer: NativePtr,
        parent: ResourceId,
        flags: KindFlags,
        native: Box<dyn Native>,
    ) -> Result<Handle> {
        if self.is_parked(pointer) {
            return Err(Error::Finalizing { pointer });
        }
        assert!(
            !self.by_pointer.contains_key(&pointer),
            "native handle {pointer} is already registered"
        );

        let parent = if parent.is_none() {
            None
        } else {
            let descriptor = self
                .by_id
                .get(&parent)
                .ok_or(Error::UseAfterRelease { id: parent })?;
            Some(Arc::clone(descriptor))
        };

        self.last_id += 1;
        let id = ResourceId::from(self.last_id);
        let lock = match &parent {
            Some(parent) => Arc::clone(&parent.lock),
            None => Arc::new(ExclusiveLock::new(id)),
        };

        let wrapper = Arc::new_cyclic(|weak| {
            let descriptor = Descriptor {
                id,
                pointer,
                parent,
                flags,
                lock,
                wrapper: weak.clone(),
                native,
                events: store.events().clone(),
            };
            Wrapper::new(store.clone(), Arc::new(descriptor))
        });

        let descriptor = wrapper.descriptor();
        let parent_id = descriptor.parent_id();
        self.by_pointer.insert(pointer, Arc::clone(descriptor));
        self.by_id.insert(id, Arc::clone(descriptor));
        if !parent_id.is_none() {
            self.hierarchy.link(parent_id, id);
        }

        Ok(Handle::from_wrapper(wrapper))
    }
}

// ---------------------------------------------------------------------------
// Registry operations
// ---------------------------------------------------------------------------

impl Store {
    /// Register a native handle and return its wrapper.
    ///
    /// `parent` is [`ResourceId::NONE`] for a root, which gets its own
    /// exclusive lock. A dependent shares the lock of its parent's family.
    ///
    /// # Errors
    /// [`Error::UseAfterRelease`] if `parent` is no longer registered,
    /// [`Error::Finalizing`] if `pointer` was unlinked but is still waiting
    /// for its teardown. The native object is dropped without being
    /// released in both cases.
    ///
    /// # Panics
    /// Panics if `pointer` is already registered. Use [`Store::open`] to
    /// wrap a handle that may have been seen before.
    pub fn register<N: Native>(
        &self,
        pointer: NativePtr,
        parent: ResourceId,
        flags: KindFlags,
        native: N,
    ) -> Result<Handle> {
        let handle = {
            let mut state = self.inner.state.lock();
            state.insert(self, pointer, parent, flags, Box::new(native))?
        };
        self.announce(&handle);
        Ok(handle)
    }

    /// Wrap a native handle, reusing the existing wrapper if the pointer is
    /// already registered.
    ///
    /// Two successive opens of the same pointer observe the same wrapper
    /// ([`Handle::ptr_eq`]) and the same id. When the pointer is known,
    /// `native` is discarded without being released.
    ///
    /// # Errors
    /// [`Error::UseAfterRelease`] if `parent` is gone, [`Error::Finalizing`]
    /// if the existing wrapper is unreachable but its teardown has not run
    /// yet.
    pub fn open<N: Native>(
        &self,
        pointer: NativePtr,
        parent: ResourceId,
        flags: KindFlags,
        native: N,
    ) -> Result<Handle> {
        let handle = {
            let mut state = self.inner.state.lock();
            if let Some(existing) = state.by_pointer.get(&pointer) {
                let wrapper = existing.wrapper.upgrade();
                drop(state);
                tracing::trace!(%pointer, "Reusing registered wrapper");
                return wrapper
                    .map(Handle::from_wrapper)
                    .ok_or(Error::Finalizing { pointer });
            }
            state.insert(self, pointer, parent, flags, Box::new(native))?
        };
        self.announce(&handle);
        Ok(handle)
    }

    /// Id of the resource registered for `pointer`, if any.
    pub fn lookup_by_pointer(&self, pointer: NativePtr) -> Option<ResourceId> {
        self.inner
            .state
            .lock()
            .by_pointer
            .get(&pointer)
            .map(|descriptor| descriptor.id)
    }

    /// Whether `id` is still registered. The sentinel id is always alive.
    pub fn is_alive(&self, id: ResourceId) -> bool {
        id.is_none() || self.inner.state.lock().by_id.contains_key(&id)
    }

    /// The wrapper of a registered resource, if it is still reachable.
    pub fn handle(&self, id: ResourceId) -> Option<Handle> {
        let state = self.inner.state.lock();
        let wrapper = state.by_id.get(&id)?.wrapper.upgrade();
        drop(state);
        wrapper.map(Handle::from_wrapper)
    }

    /// Ids of the resources opened from `id`, in registration order.
    pub fn children(&self, id: ResourceId) -> Vec<ResourceId> {
        self.inner.state.lock().hierarchy.children(id).to_vec()
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.inner.state.lock().by_id.len()
    }

    /// Whether no resource is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn announce(&self, handle: &Handle) {
        tracing::debug!(
            resource_id = %handle.id(),
            parent_id = %handle.parent_id(),
            pointer = %handle.pointer(),
            kind = handle.kind(),
            "Registered native handle"
        );
        self.events().emit(StoreEvent::Registered {
            id: handle.id(),
            parent: handle.parent_id(),
            kind: handle.kind(),
        });
    }
}
