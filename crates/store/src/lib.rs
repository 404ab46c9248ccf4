//! # Handle Store
//!
//! Lifetime and concurrent-access management for a graph of native
//! handles shared between one controlling thread and a pool of workers.
//!
//! - **Registry**: every native handle gets one descriptor, reachable by
//!   its synthetic [`ResourceId`] and by its [`NativePtr`]; re-opening a
//!   known pointer returns the same [`Handle`].
//! - **Hierarchy**: dependents are recorded under the resource they were
//!   opened from; disposing a root cascades to all of them.
//! - **Locks**: one exclusive lock per root family, acquired in ascending
//!   root order as a whole batch so multi-family operations cannot
//!   deadlock ([`Store::acquire`], [`Store::try_acquire`]).
//! - **Disposal**: explicit [`Store::dispose`] and the finalizer of the
//!   last dropped [`Handle`] may race in any order; the native teardown
//!   runs exactly once, after both.
//! - **Jobs**: [`Store::spawn`] runs work on tokio's blocking pool under
//!   the right locks and always releases them.
//!
//! ```rust
//! use handle_store::{KindFlags, Native, NativePtr, ResourceId, Store};
//!
//! struct Dataset;
//! impl Native for Dataset {
//!     fn kind(&self) -> &'static str {
//!         "dataset"
//!     }
//! }
//!
//! let store = Store::new();
//! let ds = store
//!     .register(NativePtr::from_addr(0x1000), ResourceId::NONE, KindFlags::NONE, Dataset)
//!     .unwrap();
//!
//! let answer = store
//!     .run_blocking(&[ds.clone()], |locks| {
//!         let _dataset: &Dataset = ds.native(locks)?;
//!         Ok(42)
//!     })
//!     .unwrap();
//! assert_eq!(answer, 42);
//!
//! ds.dispose();
//! assert!(!store.is_alive(ds.id()));
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod handle;
pub mod id;
pub mod jobs;
pub mod native;

mod descriptor;
mod dispose;
mod hierarchy;
mod lock;
mod registry;
mod store;

pub use config::StoreConfig;
pub use dispose::Trigger;
pub use error::{Error, Result};
pub use events::{EventBus, StoreEvent};
pub use guard::LockSet;
pub use handle::Handle;
pub use id::{NativePtr, ResourceId};
pub use jobs::Job;
pub use native::{KindFlags, Native};
pub use store::{Store, global};
