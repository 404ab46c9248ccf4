//! Error types for handle store operations
use thiserror::Error;

use crate::id::{NativePtr, ResourceId};

/// Result type for handle store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the registry, the lock manager and the job runner.
///
/// Registry and lock errors are detected while an operation is being set
/// up, before any worker thread touches a native handle. Only
/// [`Error::NativeOperation`] can come back from work that already held
/// its locks.
#[derive(Error, Debug)]
pub enum Error {
    /// Store configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// The resource (or the parent it was opened from) has been released
    #[error("Resource {id} has already been released")]
    UseAfterRelease {
        /// The released resource identifier
        id: ResourceId,
    },

    /// The native handle is registered but its wrapper is being finalized
    #[error("Native handle {pointer} is being finalized")]
    Finalizing {
        /// The native pointer identity
        pointer: NativePtr,
    },

    /// The lock token does not cover the resource's family
    #[error("Resource {id} is not covered by the held locks")]
    NotLocked {
        /// The resource identifier
        id: ResourceId,
    },

    /// The handle was registered in a different store
    #[error("Resource {id} belongs to another store")]
    ForeignStore {
        /// The resource identifier in its own store
        id: ResourceId,
    },

    /// The native object is not of the requested type
    #[error("Resource {id} does not wrap a `{expected}`")]
    KindMismatch {
        /// The resource identifier
        id: ResourceId,
        /// The requested type name
        expected: &'static str,
    },

    /// The calling thread already holds the family lock it is waiting for
    #[error("Lock of resource {id} is already held by the calling thread")]
    Reentrant {
        /// The root resource whose lock is already held
        id: ResourceId,
    },

    /// The native call failed (or panicked) while its locks were held
    #[error("Native operation on {ids:?} failed: {reason}")]
    NativeOperation {
        /// The resources the operation was locking
        ids: Vec<ResourceId>,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No async runtime is available to run a job
    #[error("Async runtime unavailable: {reason}")]
    Runtime {
        /// Why the runtime could not be used
        reason: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a native operation failure without an underlying error
    pub fn native<S: Into<String>>(ids: &[ResourceId], reason: S) -> Self {
        Self::NativeOperation {
            ids: ids.to_vec(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a native operation failure wrapping the error reported by the native library
    pub fn native_with_source<E>(ids: &[ResourceId], source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::NativeOperation {
            ids: ids.to_vec(),
            reason: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether the error reports an already released resource
    #[must_use]
    pub fn is_use_after_release(&self) -> bool {
        matches!(self, Self::UseAfterRelease { .. })
    }

    /// Get the resource ID associated with this error (if any)
    #[must_use]
    pub fn resource_id(&self) -> Option<ResourceId> {
        match self {
            Self::Configuration { .. } | Self::Finalizing { .. } | Self::Runtime { .. } => None,
            Self::NativeOperation { ids, .. } => ids.first().copied(),
            Self::UseAfterRelease { id }
            | Self::NotLocked { id }
            | Self::ForeignStore { id }
            | Self::KindMismatch { id, .. }
            | Self::Reentrant { id } => Some(*id),
        }
    }
}
