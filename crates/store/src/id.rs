//! Identities: synthetic resource ids and native pointer identities.

use std::fmt;

/// Process-unique identity of a registered resource.
///
/// Ids are handed out in increasing order and never reused. The value `0`
/// ([`ResourceId::NONE`]) is a sentinel meaning "no parent" / "no lock
/// needed" and is always considered alive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    /// The sentinel id.
    pub const NONE: Self = Self(0);

    /// The raw integer value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Whether this is the sentinel id.
    #[must_use]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for ResourceId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identity of a native handle, usually its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NativePtr(usize);

impl NativePtr {
    /// Identity of a raw pointer.
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    /// Identity from a plain address or handle number.
    #[must_use]
    pub fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    /// The raw address.
    #[must_use]
    pub fn addr(self) -> usize {
        self.0
    }
}

impl fmt::Display for NativePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Sort ascending, drop duplicates and the sentinel.
///
/// Every multi-lock acquisition goes through this order so that no two
/// callers can wait on each other in a cycle.
pub(crate) fn normalize(ids: &[ResourceId]) -> Vec<ResourceId> {
    let mut ids: Vec<ResourceId> = ids.iter().copied().filter(|id| !id.is_none()).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
