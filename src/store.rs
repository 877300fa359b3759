//! The tree store: versioned state, transactions, commit application and
//! notification fan-out for one shard.

use crate::candidate::{apply_to_modification, diff, Candidate};
use crate::cohort::Cohort;
use crate::error::{Result, StoreError};
use crate::listeners::{ListenerRegistration, ListenerRegistry, TreeChangeListener};
use crate::modification::Modification;
use crate::tree::{Node, Snapshot};
use crate::types::{Path, SchemaContext, TransactionId, TreeType};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct TreeStoreConfig {
    /// Shard name, carried into logs.
    pub name: String,

    /// Which logical tree this store holds.
    pub tree_type: TreeType,
}

impl Default for TreeStoreConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            tree_type: TreeType::Operational,
        }
    }
}

/// The authoritative in-memory tree for one shard.
///
/// Readers take snapshots without locking out writers; transactions stage
/// operations in an overlay and commit through a [`Cohort`]. The store
/// itself guards only the root swap; serializing the
/// canCommit → preCommit → commit pipeline is the caller's obligation
/// (one designated task or external lock per store instance).
pub struct TreeStore {
    config: TreeStoreConfig,

    /// Externally owned schema, carried opaquely.
    schema: SchemaContext,

    /// Latest committed state.
    current: RwLock<Snapshot>,

    /// Change-listener registrations.
    listeners: ListenerRegistry,

    /// Guards the apply-and-swap step of a commit or snapshot install.
    commit_lock: Mutex<()>,

    /// Set when a commit-time apply failed; the store then refuses further
    /// commits and requires external recovery.
    poisoned: AtomicBool,
}

impl TreeStore {
    /// Create an empty store at version zero.
    pub fn new(config: TreeStoreConfig, schema: SchemaContext) -> Self {
        TreeStore {
            config,
            schema,
            current: RwLock::new(Snapshot::empty()),
            listeners: ListenerRegistry::new(),
            commit_lock: Mutex::new(()),
            poisoned: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &TreeStoreConfig {
        &self.config
    }

    /// The schema handle supplied at construction, uninterpreted.
    pub fn schema_context(&self) -> &SchemaContext {
        &self.schema
    }

    /// The latest committed state. Non-blocking; never observes a partial
    /// commit.
    pub fn current_snapshot(&self) -> Snapshot {
        self.current.read().clone()
    }

    /// The current root, for shipping as a full-state snapshot.
    pub fn take_state_snapshot(&self) -> Arc<Node> {
        self.current.read().root().clone()
    }

    // --- Transactions ---

    /// Open a read-only transaction over the current state.
    pub fn new_read_only_transaction(&self, id: TransactionId) -> ReadOnlyTransaction {
        ReadOnlyTransaction {
            id,
            snapshot: self.current_snapshot(),
        }
    }

    /// Open a read-write transaction whose overlay is based on the current
    /// state.
    pub fn new_read_write_transaction(&self, id: TransactionId) -> ReadWriteTransaction {
        ReadWriteTransaction {
            id,
            modification: Modification::new(self.current_snapshot()),
        }
    }

    /// Seal a read-write transaction and hand it to the commit protocol.
    pub fn finish_transaction(&self, mut transaction: ReadWriteTransaction) -> Cohort<'_> {
        transaction.modification.ready();
        Cohort::new(self, transaction.id, transaction.modification)
    }

    // --- Listeners ---

    /// Subscribe `listener` to changes at or under `path`.
    pub fn register_tree_change_listener(
        &self,
        path: Path,
        listener: Arc<dyn TreeChangeListener>,
    ) -> ListenerRegistration {
        self.listeners.register(path, listener)
    }

    /// Number of live listener registrations.
    pub fn listener_count(&self) -> usize {
        self.listeners.registration_count()
    }

    // --- State replacement ---

    /// Install an externally supplied full tree (e.g. from a snapshot
    /// transfer), advancing the version and notifying listeners with the
    /// diff of old vs new root. An identical tree notifies nothing.
    pub fn apply_snapshot(&self, new_root: impl Into<Arc<Node>>) -> Result<Candidate> {
        self.ensure_usable()?;
        let new_root = new_root.into();
        let (candidate, version) = {
            let _guard = self.commit_lock.lock();
            let current = self.current.read().clone();
            let candidate = diff(current.root(), &new_root, Path::root());
            let next = Snapshot::new(new_root, current.version().next());
            let version = next.version();
            *self.current.write() = next;
            (candidate, version)
        };
        debug!(
            shard = %self.config.name,
            tree = %self.config.tree_type,
            %version,
            "installed full-state snapshot"
        );
        if !candidate.is_empty() {
            self.listeners.notify(&candidate);
        }
        Ok(candidate)
    }

    // --- Commit plumbing ---

    pub(crate) fn ensure_usable(&self) -> Result<()> {
        if self.poisoned.load(Ordering::Acquire) {
            Err(StoreError::StoreFailed)
        } else {
            Ok(())
        }
    }

    /// Apply a validated candidate to the current state.
    ///
    /// The candidate is replayed against the current root rather than
    /// swapping in its after image wholesale, so a commit validated against
    /// an older version composes with intervening non-overlapping commits.
    /// A failure here is fatal to the store instance.
    pub(crate) fn commit_candidate(
        &self,
        transaction_id: TransactionId,
        candidate: &Candidate,
    ) -> Result<Snapshot> {
        self.ensure_usable()?;
        let started = Instant::now();
        let next = {
            let _guard = self.commit_lock.lock();
            let current = self.current.read().clone();
            let mut overlay = Modification::new(current.clone());
            let root = apply_to_modification(&mut overlay, candidate)
                .and_then(|()| {
                    overlay.ready();
                    overlay.materialize()
                })
                .map_err(|err| self.poison(transaction_id, err))?;
            let next = Snapshot::new(root, current.version().next());
            *self.current.write() = next.clone();
            next
        };
        debug!(
            shard = %self.config.name,
            transaction = %transaction_id,
            version = %next.version(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "committed transaction"
        );
        if !candidate.is_empty() {
            self.listeners.notify(candidate);
        }
        Ok(next)
    }

    fn poison(&self, transaction_id: TransactionId, err: StoreError) -> StoreError {
        self.poisoned.store(true, Ordering::Release);
        warn!(
            shard = %self.config.name,
            transaction = %transaction_id,
            error = %err,
            "commit-time apply failed; store requires recovery"
        );
        err
    }
}

/// A read-only transaction: a pinned snapshot.
pub struct ReadOnlyTransaction {
    id: TransactionId,
    snapshot: Snapshot,
}

impl ReadOnlyTransaction {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

/// A read-write transaction: an overlay over the snapshot it was opened at.
pub struct ReadWriteTransaction {
    id: TransactionId,
    modification: Modification,
}

impl ReadWriteTransaction {
    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn modification(&self) -> &Modification {
        &self.modification
    }

    pub fn modification_mut(&mut self) -> &mut Modification {
        &mut self.modification
    }
}
