//! RAII token for held family locks

use std::marker::PhantomData;
use std::sync::Arc;

use crate::id::ResourceId;
use crate::lock::ExclusiveLock;
use crate::store::Store;

/// Proof that the calling thread holds a set of family locks.
///
/// Dropping the token gives every lock back and wakes all waiters,
/// whichever way the protected operation ends (return, error or panic).
/// Tokens are bound to the thread that acquired them.
pub struct LockSet {
    store: Store,
    locks: Vec<Arc<ExclusiveLock>>,
    _thread_bound: PhantomData<*const ()>,
}

impl LockSet {
    pub(crate) fn new(store: Store, locks: Vec<Arc<ExclusiveLock>>) -> Self {
        Self {
            store,
            locks,
            _thread_bound: PhantomData,
        }
    }

    /// Root ids of the held families, ascending.
    #[must_use]
    pub fn roots(&self) -> Vec<ResourceId> {
        self.locks.iter().map(|lock| lock.root()).collect()
    }

    /// Whether the family rooted at `root` is held.
    #[must_use]
    pub fn holds(&self, root: ResourceId) -> bool {
        self.locks.iter().any(|lock| lock.root() == root)
    }

    /// Number of held families.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no family is held (every requested id was the sentinel).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        self.store.release(&self.locks);
        if !self.locks.is_empty() {
            tracing::trace!(roots = ?self.roots(), "Released family locks");
        }
    }
}

impl std::fmt::Debug for LockSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockSet")
            .field("roots", &self.roots())
            .finish()
    }
}
