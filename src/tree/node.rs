//! Copy-on-write tree nodes.
//!
//! A [`Node`] is immutable once constructed: every "mutation" builds a new
//! node that shares untouched children with the previous version by `Arc`.
//! Pointer identity of shared subtrees is what makes diffing proportional
//! to the number of changed paths rather than the tree size.

use crate::types::{Segment, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A keyed tree node: an optional leaf payload plus an ordered mapping from
/// child key to child node.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Node {
    value: Option<Value>,
    children: BTreeMap<Segment, Arc<Node>>,
}

impl Node {
    /// An empty container with no payload.
    pub fn container() -> Self {
        Node::default()
    }

    /// A leaf carrying a payload value.
    pub fn leaf(value: impl Into<Value>) -> Self {
        Node {
            value: Some(value.into()),
            children: BTreeMap::new(),
        }
    }

    /// Builder-style: set the payload value.
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Builder-style: attach a child under `key`.
    pub fn with_child(mut self, key: impl Into<Segment>, child: impl Into<Arc<Node>>) -> Self {
        self.children.insert(key.into(), child.into());
        self
    }

    /// Builder-style: remove the child under `key` if present.
    pub fn without_child(mut self, key: &Segment) -> Self {
        self.children.remove(key);
        self
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn children(&self) -> &BTreeMap<Segment, Arc<Node>> {
        &self.children
    }

    pub fn child(&self, key: &Segment) -> Option<&Arc<Node>> {
        self.children.get(key)
    }

    /// True if the node carries neither a payload nor children.
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    /// Walk `segments` down from this node.
    pub fn descendant(&self, segments: &[Segment]) -> Option<&Node> {
        let mut node = self;
        for segment in segments {
            node = node.child(segment)?.as_ref();
        }
        Some(node)
    }

    /// Recursive union of `base` and `incoming`.
    ///
    /// `incoming`'s payload wins where present; children present on both
    /// sides merge recursively, children present on one side are kept.
    pub fn merge(base: &Arc<Node>, incoming: &Arc<Node>) -> Arc<Node> {
        if Arc::ptr_eq(base, incoming) {
            return incoming.clone();
        }
        let mut merged = (**base).clone();
        if incoming.value.is_some() {
            merged.value = incoming.value.clone();
        }
        for (key, child) in &incoming.children {
            let merged_child = match merged.children.get(key) {
                Some(existing) => Node::merge(existing, child),
                None => child.clone(),
            };
            merged.children.insert(key.clone(), merged_child);
        }
        Arc::new(merged)
    }
}
