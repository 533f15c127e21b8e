//! Core shared types - node status and the opaque rendered-tree vocabulary.
//!
//! The runtime never inspects host nodes; it only sequences calls against
//! them. Everything the host side hands us is wrapped in [`TreeHandle`],
//! an opaque reference the backend downcasts on its own side.

use std::any::Any;
use std::rc::Rc;

use serde::Serialize;

// =============================================================================
// Node Status
// =============================================================================

/// Lifecycle status of a component node.
///
/// Status only ever moves forward: `New` → `Mounted` → `Destroyed`, or
/// `New` → `Destroyed` when a node is torn down before its first commit.
/// A `Destroyed` node is terminal and never reused.
/// Serializable for inspection tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum NodeStatus {
    /// Created but nothing committed to the rendered tree yet.
    New,
    /// At least one output has been committed.
    Mounted,
    /// Torn down; terminal.
    Destroyed,
}

// =============================================================================
// Opaque host-tree references
// =============================================================================

/// Opaque reference to a single host node (a DOM element, a terminal cell
/// region, ...). The runtime passes these through untouched; backends
/// downcast them to their concrete node type.
pub type TreeHandle = Rc<dyn Any>;

/// Where a root subtree attaches in the host tree.
#[derive(Clone)]
pub struct MountPoint {
    /// Host node the subtree is inserted under.
    pub parent: TreeHandle,
    /// Optional sibling the subtree is inserted before. `None` appends.
    pub anchor: Option<TreeHandle>,
}

impl MountPoint {
    /// Mount point appending under `parent`.
    pub fn new(parent: TreeHandle) -> Self {
        Self { parent, anchor: None }
    }

    /// Mount point inserting before `anchor` under `parent`.
    pub fn before(parent: TreeHandle, anchor: TreeHandle) -> Self {
        Self {
            parent,
            anchor: Some(anchor),
        }
    }
}

// =============================================================================
// Patch / mount options
// =============================================================================

/// Options forwarded to [`RenderedTree::patch`](crate::backend::RenderedTree::patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PatchOptions {
    /// The subtree is being repositioned as part of a keyed move rather than
    /// re-rendered in place.
    pub moved: bool,
}

/// Options carried by a mount-variant root unit and forwarded to
/// [`RenderedTree::mount`](crate::backend::RenderedTree::mount).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MountOptions {
    /// Clear any existing content under the mount parent before attaching.
    pub clear_target: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_ordered_forward() {
        assert!(NodeStatus::New < NodeStatus::Mounted);
        assert!(NodeStatus::Mounted < NodeStatus::Destroyed);
    }

    #[test]
    fn test_mount_point_anchor() {
        let parent: TreeHandle = Rc::new("parent");
        let anchor: TreeHandle = Rc::new("anchor");

        let append = MountPoint::new(parent.clone());
        assert!(append.anchor.is_none());

        let insert = MountPoint::before(parent, anchor);
        assert!(insert.anchor.is_some());
    }
}
