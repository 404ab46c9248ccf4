//! Parent/child edges between registered resources.

use std::collections::HashMap;

use crate::id::ResourceId;

/// Records which resources were opened from which parent.
///
/// Only mutated under the registry mutex. Children are kept in
/// registration order; cascading disposal walks them newest first.
#[derive(Debug, Default)]
pub(crate) struct Hierarchy {
    children: HashMap<ResourceId, Vec<ResourceId>>,
}

impl Hierarchy {
    pub(crate) fn link(&mut self, parent: ResourceId, child: ResourceId) {
        self.children.entry(parent).or_default().push(child);
    }

    /// Remove a single edge. A missing edge is not an error.
    pub(crate) fn detach(&mut self, parent: ResourceId, child: ResourceId) {
        if let Some(children) = self.children.get_mut(&parent) {
            children.retain(|id| *id != child);
            if children.is_empty() {
                self.children.remove(&parent);
            }
        }
    }

    /// Remove and return every child of `parent`.
    pub(crate) fn take_children(&mut self, parent: ResourceId) -> Vec<ResourceId> {
        self.children.remove(&parent).unwrap_or_default()
    }

    pub(crate) fn children(&self, parent: ResourceId) -> &[ResourceId] {
        self.children.get(&parent).map(Vec::as_slice).unwrap_or_default()
    }
}
