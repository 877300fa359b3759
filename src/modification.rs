//! Pending-write overlay layered over a base snapshot.
//!
//! A [`Modification`] records write/merge/delete operations in a tree shaped
//! like the data itself, without touching the store. Reads through the
//! overlay see pending operations layered over the base. Recording always
//! succeeds locally; structural problems surface at commit validation.

use crate::error::{Result, StoreError};
use crate::tree::{Node, Snapshot};
use crate::types::{Path, Segment};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Operation recorded against a single overlay node.
#[derive(Clone, Debug, Default)]
pub enum Operation {
    /// No operation of its own; present to reach modified descendants.
    #[default]
    Unmodified,
    /// Replace the subtree with the given node.
    Write(Arc<Node>),
    /// Recursive union with the existing subtree.
    Merge(Arc<Node>),
    /// Remove the subtree.
    Delete,
}

#[derive(Debug, Default)]
struct ModNode {
    op: Operation,
    children: BTreeMap<Segment, ModNode>,
}

impl ModNode {
    fn node_at(&mut self, segments: &[Segment]) -> &mut ModNode {
        let mut node = self;
        for segment in segments {
            node = node.children.entry(segment.clone()).or_default();
        }
        node
    }

    fn record_write(&mut self, subtree: Arc<Node>) {
        // A write supersedes anything recorded deeper.
        self.op = Operation::Write(subtree);
        self.children.clear();
    }

    fn record_delete(&mut self) {
        self.op = Operation::Delete;
        self.children.clear();
    }

    /// Merges compose with what is already recorded instead of discarding
    /// it. Portions of `incoming` that overlap an already-recorded child are
    /// folded into that child so application order stays newest-wins.
    fn record_merge(&mut self, incoming: Arc<Node>) {
        let mut remainder = (*incoming).clone();
        for (segment, child) in self.children.iter_mut() {
            if let Some(overlap) = remainder.children().get(segment).cloned() {
                remainder = remainder.without_child(segment);
                child.record_merge(overlap);
            }
        }
        let remainder = Arc::new(remainder);
        self.op = match std::mem::take(&mut self.op) {
            Operation::Unmodified => Operation::Merge(remainder),
            Operation::Merge(prev) => Operation::Merge(Node::merge(&prev, &remainder)),
            Operation::Write(prev) => Operation::Write(Node::merge(&prev, &remainder)),
            // A delete followed by a merge nets out to a write of the
            // merged content.
            Operation::Delete => Operation::Write(remainder),
        };
    }
}

/// View of a subtree after one node's own operation, before child operations.
fn op_view(op: &Operation, base: Option<Arc<Node>>) -> Option<Arc<Node>> {
    match op {
        Operation::Unmodified => base,
        Operation::Write(subtree) => Some(subtree.clone()),
        Operation::Delete => None,
        Operation::Merge(incoming) => Some(match base {
            Some(existing) => Node::merge(&existing, incoming),
            None => incoming.clone(),
        }),
    }
}

/// Materialize the subtree described by `mn` over `base`.
///
/// Returns None when the subtree does not exist afterwards. A node that did
/// not exist in the base is only materialized if operations actually left
/// content under it.
fn apply_node(mn: &ModNode, base: Option<Arc<Node>>) -> Option<Arc<Node>> {
    let current = op_view(&mn.op, base);
    if mn.children.is_empty() {
        return current;
    }
    let existed = current.is_some();
    let mut node = current.map(|n| (*n).clone()).unwrap_or_else(Node::container);
    for (segment, child_mn) in &mn.children {
        let base_child = node.child(segment).cloned();
        match apply_node(child_mn, base_child) {
            Some(new_child) => node = node.with_child(segment.clone(), new_child),
            None => node = node.without_child(segment),
        }
    }
    if !existed && node.is_empty() {
        None
    } else {
        Some(Arc::new(node))
    }
}

/// A mutable set of pending operations against a base [`Snapshot`].
#[derive(Debug)]
pub struct Modification {
    base: Snapshot,
    root: ModNode,
    sealed: bool,
}

impl Modification {
    pub fn new(base: Snapshot) -> Self {
        Modification {
            base,
            root: ModNode::default(),
            sealed: false,
        }
    }

    pub fn base(&self) -> &Snapshot {
        &self.base
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Replace the subtree at `path`. The target may or may not exist; a
    /// missing ancestor is reported at commit validation, not here.
    pub fn write(&mut self, path: &Path, subtree: impl Into<Arc<Node>>) -> Result<()> {
        self.check_mutable()?;
        self.root.node_at(path.segments()).record_write(subtree.into());
        Ok(())
    }

    /// Merge `subtree` into the tree at `path`, auto-creating missing
    /// ancestors and preserving existing children not overridden.
    pub fn merge(&mut self, path: &Path, subtree: impl Into<Arc<Node>>) -> Result<()> {
        self.check_mutable()?;
        self.root.node_at(path.segments()).record_merge(subtree.into());
        Ok(())
    }

    /// Remove the subtree at `path`. Deleting an absent target is a no-op.
    pub fn delete(&mut self, path: &Path) -> Result<()> {
        self.check_mutable()?;
        self.root.node_at(path.segments()).record_delete();
        Ok(())
    }

    /// Read the subtree at `path` with pending operations layered over the
    /// base, so reads-after-writes within this overlay are consistent.
    pub fn read_node(&self, path: &Path) -> Option<Arc<Node>> {
        fn walk(
            mn: Option<&ModNode>,
            base: Option<Arc<Node>>,
            segments: &[Segment],
        ) -> Option<Arc<Node>> {
            let Some(mn) = mn else {
                let mut node = base?;
                for segment in segments {
                    let next = node.child(segment)?.clone();
                    node = next;
                }
                return Some(node);
            };
            if segments.is_empty() {
                return apply_node(mn, base);
            }
            let effective = op_view(&mn.op, base);
            let segment = &segments[0];
            let base_child = effective.and_then(|n| n.child(segment).cloned());
            walk(mn.children.get(segment), base_child, &segments[1..])
        }
        walk(
            Some(&self.root),
            Some(self.base.root().clone()),
            path.segments(),
        )
    }

    /// Seal the overlay. No further mutation is accepted; required before
    /// validation, diffing or commit. Idempotent.
    pub fn ready(&mut self) {
        self.sealed = true;
    }

    /// Compute the full after-state root of this overlay over its own base.
    /// A deleted root materializes as an empty container.
    pub fn materialize(&self) -> Result<Arc<Node>> {
        if !self.sealed {
            return Err(StoreError::NotSealed);
        }
        Ok(apply_node(&self.root, Some(self.base.root().clone()))
            .unwrap_or_else(|| Arc::new(Node::container())))
    }

    /// Validate the sealed overlay against `current`, which may be newer
    /// than the base this overlay was recorded on.
    ///
    /// Checks two things: structurally, every recorded write/delete must sit
    /// under an ancestor that exists in the effective tree (merges
    /// auto-create); and if the store advanced past the base version, no
    /// recorded operation may target a path whose subtree changed between
    /// base and current.
    pub fn validate_against(&self, current: &Snapshot) -> Result<()> {
        if !self.sealed {
            return Err(StoreError::NotSealed);
        }
        validate_structure(&self.root, Some(current.root().clone()), &Path::root())?;
        if current.version() != self.base.version() {
            let mut paths = Vec::new();
            collect_op_paths(&self.root, &Path::root(), &mut paths);
            for path in paths {
                let before = self.base.read_node(&path);
                let now = current.read_node(&path);
                let changed = match (&before, &now) {
                    (None, None) => false,
                    (Some(b), Some(n)) => !Arc::ptr_eq(b, n) && b != n,
                    _ => true,
                };
                if changed {
                    return Err(StoreError::ConflictingModification { path });
                }
            }
        }
        Ok(())
    }

    fn check_mutable(&self) -> Result<()> {
        if self.sealed {
            Err(StoreError::AlreadySealed)
        } else {
            Ok(())
        }
    }
}

fn validate_structure(mn: &ModNode, base: Option<Arc<Node>>, path: &Path) -> Result<()> {
    let effective = op_view(&mn.op, base);
    for (segment, child_mn) in &mn.children {
        let child_path = path.child(segment.clone());
        if effective.is_none() && matches!(child_mn.op, Operation::Write(_) | Operation::Delete) {
            return Err(StoreError::StructuralConflict {
                path: child_path,
                reason: "parent node does not exist".to_string(),
            });
        }
        let base_child = effective.as_ref().and_then(|n| n.child(segment).cloned());
        validate_structure(child_mn, base_child, &child_path)?;
    }
    Ok(())
}

fn collect_op_paths(mn: &ModNode, path: &Path, out: &mut Vec<Path>) {
    if !matches!(mn.op, Operation::Unmodified) {
        out.push(path.clone());
    }
    for (segment, child) in &mn.children {
        collect_op_paths(child, &path.child(segment.clone()), out);
    }
}
