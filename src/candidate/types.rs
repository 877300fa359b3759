//! Candidate data types.

use crate::tree::Node;
use crate::types::{Path, Segment};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How a single node changed between the before and after states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModificationType {
    /// Nothing changed at or under this node.
    Unmodified,
    /// The node's own content was created or replaced.
    Write,
    /// The node was removed.
    Delete,
    /// The node itself is intact but descendants changed.
    SubtreeModified,
    /// A valueless container came into existence so descendants could.
    Appeared,
    /// A valueless container ceased to exist with its descendants.
    Disappeared,
}

/// One node of a candidate: the change kind, before/after images, and the
/// changed children.
///
/// Children are recorded beneath `Write` and `Delete` nodes as well, so
/// notification resolution can navigate below a wholesale replacement;
/// replay short-circuits at those nodes and ignores the children.
#[derive(Clone, Debug)]
pub struct CandidateNode {
    modification_type: ModificationType,
    before: Option<Arc<Node>>,
    after: Option<Arc<Node>>,
    children: BTreeMap<Segment, CandidateNode>,
}

impl CandidateNode {
    pub(crate) fn new(
        modification_type: ModificationType,
        before: Option<Arc<Node>>,
        after: Option<Arc<Node>>,
        children: BTreeMap<Segment, CandidateNode>,
    ) -> Self {
        CandidateNode {
            modification_type,
            before,
            after,
            children,
        }
    }

    pub(crate) fn unmodified() -> Self {
        CandidateNode {
            modification_type: ModificationType::Unmodified,
            before: None,
            after: None,
            children: BTreeMap::new(),
        }
    }

    pub fn modification_type(&self) -> ModificationType {
        self.modification_type
    }

    /// Subtree as it was before the change, where one existed.
    pub fn before(&self) -> Option<&Arc<Node>> {
        self.before.as_ref()
    }

    /// Subtree as it is after the change, where one exists.
    pub fn after(&self) -> Option<&Arc<Node>> {
        self.after.as_ref()
    }

    /// Changed children, in key order.
    pub fn children(&self) -> &BTreeMap<Segment, CandidateNode> {
        &self.children
    }

    pub fn child(&self, key: &Segment) -> Option<&CandidateNode> {
        self.children.get(key)
    }
}

/// An immutable diff tree rooted at a path.
///
/// A candidate is a faithful, replayable description of how one tree state
/// became another: applying it to any overlay whose base equals the
/// candidate's before state produces exactly the after state.
#[derive(Clone, Debug)]
pub struct Candidate {
    root_path: Path,
    root: CandidateNode,
}

impl Candidate {
    pub(crate) fn new(root_path: Path, root: CandidateNode) -> Self {
        Candidate { root_path, root }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn root_node(&self) -> &CandidateNode {
        &self.root
    }

    /// True if the candidate describes no change at all.
    pub fn is_empty(&self) -> bool {
        self.root.modification_type() == ModificationType::Unmodified
    }
}
