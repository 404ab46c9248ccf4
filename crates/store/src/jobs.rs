//! Job runner: native work under family locks, sync or on the blocking pool.
//!
//! A job names the handles it works on. They are checked before anything
//! is scheduled, kept reachable for the whole job so no finalizer can fire
//! underneath it, and dropped only after the locks are given back.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::{JoinError, JoinHandle};

use crate::error::{Error, Result};
use crate::guard::LockSet;
use crate::handle::Handle;
use crate::id::ResourceId;
use crate::store::Store;

/// A job running on tokio's blocking pool.
///
/// Resolves to the work's result. A panic inside the work is reported as
/// [`Error::NativeOperation`]; the locks have been released either way.
#[must_use = "jobs do nothing observable unless awaited"]
pub struct Job<R> {
    ids: Vec<ResourceId>,
    task: JoinHandle<Result<R>>,
}

impl<R> Job<R> {
    /// Ids of the handles the job works on.
    pub fn ids(&self) -> &[ResourceId] {
        &self.ids
    }
}

impl<R> Future for Job<R> {
    type Output = Result<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) => Poll::Ready(Err(join_failure(&this.ids, err))),
        }
    }
}

impl<R> std::fmt::Debug for Job<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("ids", &self.ids)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

fn join_failure(ids: &[ResourceId], err: JoinError) -> Error {
    if err.is_panic() {
        let reason = panic_message(err.into_panic().as_ref());
        tracing::warn!(?ids, %reason, "Job panicked while holding family locks");
        Error::native(ids, format!("worker panicked: {reason}"))
    } else {
        Error::native(ids, "worker was cancelled")
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Store {
    /// Ids of `handles`, failing on the first one that is foreign or
    /// already disposed.
    fn job_ids(&self, handles: &[Handle]) -> Result<Vec<ResourceId>> {
        handles
            .iter()
            .map(|handle| {
                if !Store::ptr_eq(handle.store(), self) {
                    Err(Error::ForeignStore { id: handle.id() })
                } else if handle.is_alive() {
                    Ok(handle.id())
                } else {
                    Err(Error::UseAfterRelease { id: handle.id() })
                }
            })
            .collect()
    }

    fn run_locked<R, F>(&self, ids: &[ResourceId], work: F) -> Result<R>
    where
        F: FnOnce(&LockSet) -> Result<R>,
    {
        let locks = self.acquire(ids)?;
        let result = work(&locks);
        drop(locks);
        if let Err(err) = &result {
            tracing::debug!(?ids, error = %err, "Job failed");
        }
        result
    }

    /// Run `work` on the calling thread once the families of `handles`
    /// are locked.
    ///
    /// # Errors
    /// [`Error::UseAfterRelease`] or [`Error::ForeignStore`] before
    /// anything is locked if a handle is already disposed or registered
    /// elsewhere; otherwise whatever `work` returns.
    pub fn run_blocking<R, F>(&self, handles: &[Handle], work: F) -> Result<R>
    where
        F: FnOnce(&LockSet) -> Result<R>,
    {
        let ids = self.job_ids(handles)?;
        self.run_locked(&ids, work)
    }

    /// Schedule `work` on the blocking pool of the current tokio runtime.
    ///
    /// The handles are validated here, synchronously, before any worker
    /// is engaged. The worker then blocks until the families are locked,
    /// runs `work`, releases the locks and finally drops the handles.
    ///
    /// # Errors
    /// [`Error::UseAfterRelease`] if a handle is already disposed,
    /// [`Error::ForeignStore`] if it belongs to another store,
    /// [`Error::Runtime`] when called outside a tokio runtime.
    pub fn spawn<R, F>(&self, handles: Vec<Handle>, work: F) -> Result<Job<R>>
    where
        R: Send + 'static,
        F: FnOnce(&LockSet) -> Result<R> + Send + 'static,
    {
        let ids = self.job_ids(&handles)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|err| Error::Runtime {
            reason: err.to_string(),
        })?;

        let store = self.clone();
        let job_ids = ids.clone();
        let task = runtime.spawn_blocking(move || {
            let persisted = handles;
            let result = store.run_locked(&job_ids, work);
            drop(persisted);
            result
        });

        Ok(Job { ids, task })
    }
}
