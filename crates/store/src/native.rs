//! The seam between the store and the wrapped native library.

use std::any::Any;

use crate::id::NativePtr;

/// A native object owned by the store.
///
/// The store never calls into the native library itself except through
/// these two teardown hooks, and it calls them exactly once, after every
/// reference to the descriptor is gone. Teardown always runs while the
/// family lock is held, so the hooks may touch the root handle.
pub trait Native: Any + Send + Sync {
    /// Short kind tag used in logs and events (`"dataset"`, `"layer"`, ...).
    fn kind(&self) -> &'static str {
        "handle"
    }

    /// Close or release the underlying handle.
    ///
    /// Roots close their connection here. Ordinary dependents usually
    /// have nothing to do and keep the default.
    fn release(&mut self) {}

    /// Release a transient result set that was produced by this handle.
    ///
    /// Called on the parent's native object when a dependent flagged
    /// [`KindFlags::TRANSIENT_RESULT`] is torn down.
    fn release_result_set(&self, result: NativePtr) {
        let _ = result;
    }
}

/// Kind-specific metadata recorded at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindFlags {
    transient_result: bool,
}

impl KindFlags {
    /// An ordinary root or stored dependent.
    pub const NONE: Self = Self {
        transient_result: false,
    };

    /// A transient query-result view that its parent must release.
    pub const TRANSIENT_RESULT: Self = Self {
        transient_result: true,
    };

    /// Whether the resource is a transient query result.
    #[must_use]
    pub fn is_transient_result(self) -> bool {
        self.transient_result
    }
}
