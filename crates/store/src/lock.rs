//! Lock manager: exclusive per-family access for worker threads.
//!
//! The wrapped library must never see two concurrent calls against the
//! same root handle or anything opened from it. Each root owns one
//! [`ExclusiveLock`]; dependents share it. Operations that need several
//! families take all of their locks as one batch:
//!
//! 1. the requested ids are resolved to their family roots, sorted
//!    ascending and deduplicated;
//! 2. under the registry mutex every lock is tried, in that order, without
//!    blocking;
//! 3. if any lock is taken, the ones grabbed in this pass are given back
//!    and the caller sleeps on the shared condition variable, then retries
//!    the whole batch.
//!
//! A caller never holds part of its batch while it sleeps, so no wait
//! cycle can form between two multi-family operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::MutexGuard;

use crate::error::{Error, Result};
use crate::events::StoreEvent;
use crate::guard::LockSet;
use crate::id::{self, ResourceId};
use crate::registry::State;
use crate::store::Store;

// ---------------------------------------------------------------------------
// ExclusiveLock
// ---------------------------------------------------------------------------

const FREE: u64 = 0;

/// Token identifying the calling thread as a lock holder. Never zero.
pub(crate) fn current_holder() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static HOLDER: u64 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    HOLDER.with(|holder| *holder)
}

/// Capacity-one permit guarding a family of native handles.
///
/// The permit only changes hands while the registry mutex is held; the
/// atomic just records which thread has it, so that disposal running on
/// a thread that already owns the family does not wait for itself.
#[derive(Debug)]
pub(crate) struct ExclusiveLock {
    root: ResourceId,
    holder: AtomicU64,
}

impl ExclusiveLock {
    pub(crate) fn new(root: ResourceId) -> Self {
        Self {
            root,
            holder: AtomicU64::new(FREE),
        }
    }

    /// Id of the root resource that owns this lock.
    pub(crate) fn root(&self) -> ResourceId {
        self.root
    }

    pub(crate) fn try_take(&self, holder: u64) -> bool {
        self.holder
            .compare_exchange(FREE, holder, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn give_back(&self) {
        self.holder.store(FREE, Ordering::Release);
    }

    pub(crate) fn is_held_by(&self, holder: u64) -> bool {
        self.holder.load(Ordering::Acquire) == holder
    }
}

/// One lock of the batch was already taken; the pass must be retried.
#[derive(Debug)]
struct Contended {
    root: ResourceId,
}

/// Try every lock in order, giving back this pass's locks on the first miss.
fn take_all(locks: &[Arc<ExclusiveLock>], holder: u64) -> std::result::Result<(), Contended> {
    for (taken, lock) in locks.iter().enumerate() {
        if !lock.try_take(holder) {
            for lock in &locks[..taken] {
                lock.give_back();
            }
            return Err(Contended { root: lock.root() });
        }
    }
    Ok(())
}

impl State {
    /// The family locks of `ids`, in ascending root order without duplicates.
    fn family_locks(&self, ids: &[ResourceId]) -> Result<Vec<Arc<ExclusiveLock>>> {
        let mut locks = Vec::with_capacity(ids.len());
        for &id in ids {
            let descriptor = self.get(id).ok_or(Error::UseAfterRelease { id })?;
            locks.push(Arc::clone(&descriptor.lock));
        }
        locks.sort_by_key(|lock| lock.root());
        locks.dedup_by_key(|lock| lock.root());
        Ok(locks)
    }
}

// ---------------------------------------------------------------------------
// Acquisition
// ---------------------------------------------------------------------------

impl Store {
    /// Block until the family locks of every id are held.
    ///
    /// Duplicates and [`ResourceId::NONE`] are ignored; an empty request
    /// returns an empty token immediately. The locks are released when the
    /// returned [`LockSet`] is dropped.
    ///
    /// # Errors
    /// [`Error::UseAfterRelease`] if an id is not (or no longer) registered,
    /// checked again after every wake-up. [`Error::Reentrant`] if the
    /// calling thread already holds one of the families.
    pub fn acquire(&self, ids: &[ResourceId]) -> Result<LockSet> {
        let wanted = id::normalize(ids);
        let holder = current_holder();
        let threshold = self.config().slow_wait_threshold;
        let started = Instant::now();
        let mut contended = false;
        let mut warned = false;

        let mut state = self.inner.state.lock();
        loop {
            let locks = state.family_locks(&wanted)?;
            if let Some(lock) = locks.iter().find(|lock| lock.is_held_by(holder)) {
                return Err(Error::Reentrant { id: lock.root() });
            }

            match take_all(&locks, holder) {
                Ok(()) => {
                    drop(state);
                    tracing::trace!(ids = ?wanted, "Acquired family locks");
                    return Ok(LockSet::new(self.clone(), locks));
                }
                Err(Contended { root }) => {
                    if !contended {
                        contended = true;
                        tracing::trace!(ids = ?wanted, root = %root, "Family lock busy, waiting");
                        self.events().emit(StoreEvent::LockContended {
                            ids: wanted.clone(),
                        });
                    }
                    self.inner.wake.wait_for(&mut state, threshold);
                    if !warned && started.elapsed() >= threshold {
                        warned = true;
                        tracing::warn!(
                            ids = ?wanted,
                            waited_ms = started.elapsed().as_millis() as u64,
                            "Still waiting for family locks"
                        );
                    }
                }
            }
        }
    }

    /// [`Store::acquire`] for a single id.
    pub fn acquire_single(&self, id: ResourceId) -> Result<LockSet> {
        self.acquire(&[id])
    }

    /// Take the family locks of every id if they are all free right now.
    ///
    /// Makes exactly one pass of the same ordered protocol and never
    /// waits. Returns `Ok(None)` when any lock is busy; nothing stays
    /// held in that case.
    ///
    /// # Errors
    /// [`Error::UseAfterRelease`] if an id is not (or no longer) registered.
    pub fn try_acquire(&self, ids: &[ResourceId]) -> Result<Option<LockSet>> {
        let wanted = id::normalize(ids);
        let holder = current_holder();

        let state = self.inner.state.lock();
        let locks = state.family_locks(&wanted)?;
        let taken = take_all(&locks, holder);
        drop(state);

        match taken {
            Ok(()) => {
                tracing::trace!(ids = ?wanted, "Acquired family locks without waiting");
                Ok(Some(LockSet::new(self.clone(), locks)))
            }
            Err(Contended { root }) => {
                tracing::trace!(ids = ?wanted, root = %root, "Family lock busy");
                Ok(None)
            }
        }
    }

    /// [`Store::try_acquire`] for a single id.
    pub fn try_acquire_single(&self, id: ResourceId) -> Result<Option<LockSet>> {
        self.try_acquire(&[id])
    }

    /// Give back every lock of a token and wake all waiters.
    ///
    /// Descriptors whose finalizer found the family busy are dropped first,
    /// outside the mutex but while the family is still held.
    pub(crate) fn release(&self, locks: &[Arc<ExclusiveLock>]) {
        if locks.is_empty() {
            return;
        }
        let mut state = self.inner.state.lock();
        for lock in locks {
            loop {
                let parked = state.take_parked(lock.root());
                if parked.is_empty() {
                    break;
                }
                tracing::trace!(root = %lock.root(), "Running deferred finalizers");
                MutexGuard::unlocked(&mut state, || drop(parked));
            }
            lock.give_back();
        }
        drop(state);
        self.inner.wake.notify_all();
    }
}
