//! Immutable, structurally shared tree storage.

mod node;
mod snapshot;

pub use node::Node;
pub use snapshot::Snapshot;
