//! Structural diff between two tree roots.

use super::types::{Candidate, CandidateNode, ModificationType};
use crate::tree::Node;
use crate::types::{Path, Segment};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Compare `before` and `after` and produce a candidate rooted at
/// `root_path`.
///
/// Subtrees shared by reference are recognized as unchanged in O(1), which
/// makes the diff proportional to the number of changed paths rather than
/// the tree size. Content-equal but unshared subtrees are pruned by deep
/// comparison, so a full-state replacement never reports entries for
/// unchanged nodes.
pub fn diff(before: &Arc<Node>, after: &Arc<Node>, root_path: Path) -> Candidate {
    Candidate::new(root_path, diff_nodes(Some(before), Some(after)))
}

fn diff_nodes(before: Option<&Arc<Node>>, after: Option<&Arc<Node>>) -> CandidateNode {
    match (before, after) {
        (None, None) => CandidateNode::unmodified(),
        (Some(b), Some(a)) => {
            if Arc::ptr_eq(b, a) || b == a {
                return CandidateNode::unmodified();
            }
            let children = diff_children(Some(b), Some(a));
            let modification_type = if b.value() != a.value() {
                ModificationType::Write
            } else if !children.is_empty() {
                ModificationType::SubtreeModified
            } else {
                ModificationType::Unmodified
            };
            if modification_type == ModificationType::Unmodified {
                return CandidateNode::unmodified();
            }
            CandidateNode::new(modification_type, Some(b.clone()), Some(a.clone()), children)
        }
        (None, Some(a)) => {
            let children = diff_children(None, Some(a));
            CandidateNode::new(creation_type(a), None, Some(a.clone()), children)
        }
        (Some(b), None) => {
            let children = diff_children(Some(b), None);
            CandidateNode::new(removal_type(b), Some(b.clone()), None, children)
        }
    }
}

/// A created node that carries a payload, or is an explicitly empty
/// container, is a write; a valueless container materialized for its
/// descendants merely appeared.
fn creation_type(after: &Node) -> ModificationType {
    if after.value().is_some() || after.children().is_empty() {
        ModificationType::Write
    } else {
        ModificationType::Appeared
    }
}

fn removal_type(before: &Node) -> ModificationType {
    if before.value().is_some() || before.children().is_empty() {
        ModificationType::Delete
    } else {
        ModificationType::Disappeared
    }
}

fn diff_children(
    before: Option<&Arc<Node>>,
    after: Option<&Arc<Node>>,
) -> BTreeMap<Segment, CandidateNode> {
    let mut keys: BTreeSet<&Segment> = BTreeSet::new();
    if let Some(b) = before {
        keys.extend(b.children().keys());
    }
    if let Some(a) = after {
        keys.extend(a.children().keys());
    }

    let mut children = BTreeMap::new();
    for key in keys {
        let child = diff_nodes(
            before.and_then(|b| b.child(key)),
            after.and_then(|a| a.child(key)),
        );
        if child.modification_type() != ModificationType::Unmodified {
            children.insert(key.clone(), child);
        }
    }
    children
}
