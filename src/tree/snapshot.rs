//! Versioned read-only views of the tree.

use super::Node;
use crate::types::{Path, Version};
use std::sync::Arc;

/// An immutable root plus the version it was committed at.
///
/// Snapshots are cheap to clone (an `Arc` bump) and any number may be alive
/// concurrently; a snapshot never observes later commits.
#[derive(Clone, Debug)]
pub struct Snapshot {
    root: Arc<Node>,
    version: Version,
}

impl Snapshot {
    pub fn new(root: Arc<Node>, version: Version) -> Self {
        Snapshot { root, version }
    }

    /// An empty tree at version zero.
    pub fn empty() -> Self {
        Snapshot {
            root: Arc::new(Node::container()),
            version: Version::default(),
        }
    }

    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Read the subtree at `path`, or None if the path does not exist.
    pub fn read_node(&self, path: &Path) -> Option<Arc<Node>> {
        let mut node = self.root.clone();
        for segment in path.segments() {
            let next = node.child(segment)?.clone();
            node = next;
        }
        Some(node)
    }
}
