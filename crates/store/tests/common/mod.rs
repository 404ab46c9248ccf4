//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use handle_store::{Handle, KindFlags, Native, NativePtr, ResourceId, Store};
use parking_lot::Mutex;

/// Ordered log of native calls, shared by every recorded native object.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }
}

/// Native object that writes every teardown call to a [`Journal`].
pub struct Recorded {
    pub name: &'static str,
    pub kind: &'static str,
    pub journal: Journal,
}

impl Native for Recorded {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn release(&mut self) {
        self.journal.push(format!("release {}", self.name));
    }

    fn release_result_set(&self, result: NativePtr) {
        self.journal
            .push(format!("release_result_set {} {result}", self.name));
    }
}

pub fn ptr(addr: usize) -> NativePtr {
    NativePtr::from_addr(addr)
}

/// Register a recorded root.
pub fn root(store: &Store, journal: &Journal, addr: usize, name: &'static str) -> Handle {
    store
        .register(
            ptr(addr),
            ResourceId::NONE,
            KindFlags::NONE,
            Recorded {
                name,
                kind: "dataset",
                journal: journal.clone(),
            },
        )
        .expect("root registration")
}

/// Register a recorded dependent of `parent`.
pub fn dependent(
    store: &Store,
    journal: &Journal,
    parent: &Handle,
    addr: usize,
    name: &'static str,
    flags: KindFlags,
) -> Handle {
    store
        .register(
            ptr(addr),
            parent.id(),
            flags,
            Recorded {
                name,
                kind: "layer",
                journal: journal.clone(),
            },
        )
        .expect("dependent registration")
}

/// Run `f` on its own thread and wait at most `timeout` for it.
///
/// Returns `None` if the thread is still running, which is how the
/// deadlock tests fail instead of hanging.
pub fn within<T, F>(timeout: Duration, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(timeout).ok()
}
