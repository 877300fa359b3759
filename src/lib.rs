//! # Canopy
//!
//! A versioned, copy-on-write tree store with transactional commit and
//! change notification: the in-process data store for one shard of a
//! hierarchically-structured state tree.
//!
//! ## Core Concepts
//!
//! - **Snapshots**: Immutable, versioned views of the tree; readers never
//!   block and never observe partial commits
//! - **Modifications**: Pending write/merge/delete overlays staged per
//!   transaction, invisible until committed
//! - **Candidates**: Ordered, replayable diffs between two tree states
//! - **Cohorts**: Multi-phase commit (canCommit → preCommit → commit) with
//!   conflict detection against the latest committed state
//! - **Listeners**: Subtree-scoped change subscriptions fed from each
//!   committed candidate
//!
//! ## Concurrency
//!
//! Snapshots are lock-free to read and any number may be alive at once.
//! Transactions may be created and mutated concurrently; only the
//! canCommit → preCommit → commit pipeline is serialized, and that ordering
//! must be enforced by the caller (one designated task or external lock
//! per store instance). The store itself guards only the atomic root swap,
//! and listener callbacks run after the swap, outside the store's locks.
//!
//! ## Example
//!
//! ```
//! use canopy::{Node, Path, SchemaContext, TransactionId, TreeStore, TreeStoreConfig};
//! use serde_json::json;
//!
//! let store = TreeStore::new(TreeStoreConfig::default(), SchemaContext::default());
//!
//! let mut tx = store.new_read_write_transaction(TransactionId(1));
//! let cars: Path = ["cars"].into_iter().collect();
//! tx.modification_mut()
//!     .write(&cars, Node::container().with_child("altima", Node::leaf(json!({"price": 100}))))
//!     .unwrap();
//!
//! let mut cohort = store.finish_transaction(tx);
//! cohort.can_commit().unwrap();
//! cohort.pre_commit().unwrap();
//! cohort.commit().unwrap();
//!
//! let reader = store.new_read_only_transaction(TransactionId(2));
//! assert!(reader.snapshot().read_node(&cars).is_some());
//! ```

pub mod candidate;
pub mod cohort;
pub mod error;
pub mod listeners;
pub mod modification;
pub mod store;
pub mod tree;
pub mod types;

// Re-exports
pub use candidate::{apply_to_modification, diff, Candidate, CandidateNode, ModificationType};
pub use cohort::{Cohort, CohortState};
pub use error::{Result, StoreError};
pub use listeners::{ChannelListener, ListenerRegistration, TreeChangeListener};
pub use modification::{Modification, Operation};
pub use store::{ReadOnlyTransaction, ReadWriteTransaction, TreeStore, TreeStoreConfig};
pub use tree::{Node, Snapshot};
pub use types::*;
