//! Core types for the tree store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Leaf payload carried by tree nodes.
pub type Value = serde_json::Value;

/// Committed store version. Advances by exactly one per successful commit.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Version(pub u64);

impl Version {
    pub fn next(self) -> Self {
        Version(self.0 + 1)
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a transaction. Uniqueness among concurrently open
/// transactions is the caller's obligation; the store only carries the id
/// into logs and errors.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One step in a path: the key of a child within its parent.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Segment(String);

impl Segment {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Segment {
    fn from(s: &str) -> Self {
        Segment(s.to_string())
    }
}

impl From<String> for Segment {
    fn from(s: String) -> Self {
        Segment(s)
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered sequence of segments from the tree root to a node.
///
/// The empty path addresses the root. Equality and ancestor tests are
/// O(depth).
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// The root path.
    pub fn root() -> Self {
        Path::default()
    }

    pub fn new(segments: Vec<Segment>) -> Self {
        Path { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Extend this path by one segment.
    pub fn child(&self, segment: impl Into<Segment>) -> Path {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Path { segments }
    }

    /// The path one level up, or None for the root.
    pub fn parent(&self) -> Option<Path> {
        if self.segments.is_empty() {
            None
        } else {
            Some(Path {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            })
        }
    }

    /// True if `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        self.segments.len() < other.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// True if `self` is `other` or an ancestor of it.
    pub fn contains(&self, other: &Path) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    /// Segments of `self` below `base`, or None if `base` does not contain
    /// `self`.
    pub fn strip_prefix(&self, base: &Path) -> Option<&[Segment]> {
        if base.contains(self) {
            Some(&self.segments[base.segments.len()..])
        } else {
            None
        }
    }
}

impl<S: Into<Segment>> FromIterator<S> for Path {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Path {
            segments: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// Which logical tree a store instance holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeType {
    /// Runtime state; reset on restart.
    Operational,
    /// Intended configuration; durable via external persistence.
    Configuration,
}

impl fmt::Display for TreeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeType::Operational => write!(f, "operational"),
            TreeType::Configuration => write!(f, "configuration"),
        }
    }
}

/// Opaque handle to the externally owned schema.
///
/// The store never interprets the descriptor; it only hands it back to
/// collaborators that validate writes.
#[derive(Clone, Debug, Default)]
pub struct SchemaContext(Arc<Value>);

impl SchemaContext {
    pub fn new(descriptor: Value) -> Self {
        SchemaContext(Arc::new(descriptor))
    }

    pub fn descriptor(&self) -> &Value {
        &self.0
    }
}
