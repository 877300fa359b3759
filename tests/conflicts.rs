//! Conflict detection and protocol misuse tests.

use canopy::{
    CohortState, Node, Path, SchemaContext, StoreError, TransactionId, TreeStore, TreeStoreConfig,
};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TX: AtomicU64 = AtomicU64::new(1);

fn next_tx() -> TransactionId {
    TransactionId(NEXT_TX.fetch_add(1, Ordering::SeqCst))
}

fn test_store() -> TreeStore {
    TreeStore::new(TreeStoreConfig::default(), SchemaContext::default())
}

fn path(segments: &[&str]) -> Path {
    segments.iter().copied().collect()
}

fn commit_write(store: &TreeStore, at: &Path, node: Node) {
    let mut tx = store.new_read_write_transaction(next_tx());
    tx.modification_mut().write(at, node).unwrap();
    let mut cohort = store.finish_transaction(tx);
    cohort.can_commit().unwrap();
    cohort.pre_commit().unwrap();
    cohort.commit().unwrap();
}

fn seed_cars(store: &TreeStore) {
    commit_write(
        store,
        &path(&["cars"]),
        Node::container().with_child(
            "car",
            Node::container().with_child("altima", Node::leaf(json!({"price": 100}))),
        ),
    );
}

// --- Structural conflicts ---

#[test]
fn test_write_under_own_deleted_ancestor_aborts() {
    let store = test_store();
    seed_cars(&store);

    let mut tx = store.new_read_write_transaction(next_tx());
    tx.modification_mut().delete(&path(&["cars"])).unwrap();
    tx.modification_mut()
        .write(&path(&["cars", "car", "optima"]), Node::leaf(json!(1)))
        .unwrap();

    let mut cohort = store.finish_transaction(tx);
    let err = cohort.can_commit().unwrap_err();
    assert!(matches!(err, StoreError::StructuralConflict { .. }));
    assert_eq!(cohort.state(), CohortState::Aborted);

    // No further phase is reachable.
    let err = cohort.pre_commit().unwrap_err();
    assert!(matches!(err, StoreError::ProtocolViolation { .. }));
    assert_eq!(cohort.state(), CohortState::Failed);
}

#[test]
fn test_write_under_concurrently_deleted_ancestor_aborts() {
    let store = test_store();
    seed_cars(&store);

    // Staged against a base where cars still exists.
    let mut tx = store.new_read_write_transaction(next_tx());
    tx.modification_mut()
        .write(&path(&["cars", "car", "optima"]), Node::leaf(json!(1)))
        .unwrap();

    // A later transaction deletes cars and commits first.
    let mut delete_tx = store.new_read_write_transaction(next_tx());
    delete_tx.modification_mut().delete(&path(&["cars"])).unwrap();
    let mut delete_cohort = store.finish_transaction(delete_tx);
    delete_cohort.can_commit().unwrap();
    delete_cohort.pre_commit().unwrap();
    delete_cohort.commit().unwrap();

    let mut cohort = store.finish_transaction(tx);
    let err = cohort.can_commit().unwrap_err();
    assert!(matches!(err, StoreError::StructuralConflict { .. }));
    assert_eq!(cohort.state(), CohortState::Aborted);
}

#[test]
fn test_write_without_parent_aborts() {
    let store = test_store();

    let mut tx = store.new_read_write_transaction(next_tx());
    tx.modification_mut()
        .write(&path(&["cars", "car", "optima"]), Node::leaf(json!(1)))
        .unwrap();

    let mut cohort = store.finish_transaction(tx);
    assert!(matches!(
        cohort.can_commit(),
        Err(StoreError::StructuralConflict { .. })
    ));
}

// --- Concurrent modification conflicts ---

#[test]
fn test_overlapping_concurrent_writes_conflict() {
    let store = test_store();
    seed_cars(&store);

    let mut first = store.new_read_write_transaction(next_tx());
    first
        .modification_mut()
        .write(&path(&["cars", "car", "altima"]), Node::leaf(json!({"price": 200})))
        .unwrap();

    let mut second = store.new_read_write_transaction(next_tx());
    second
        .modification_mut()
        .write(&path(&["cars", "car", "altima"]), Node::leaf(json!({"price": 300})))
        .unwrap();

    let mut first_cohort = store.finish_transaction(first);
    first_cohort.can_commit().unwrap();
    first_cohort.pre_commit().unwrap();
    first_cohort.commit().unwrap();

    let mut second_cohort = store.finish_transaction(second);
    let err = second_cohort.can_commit().unwrap_err();
    assert!(matches!(err, StoreError::ConflictingModification { .. }));
    assert_eq!(second_cohort.state(), CohortState::Aborted);

    // First committer won.
    let snapshot = store.current_snapshot();
    assert_eq!(
        snapshot
            .read_node(&path(&["cars", "car", "altima"]))
            .unwrap()
            .value(),
        Some(&json!({"price": 200}))
    );
}

#[test]
fn test_disjoint_concurrent_writes_both_commit() {
    let store = test_store();
    seed_cars(&store);

    let mut first = store.new_read_write_transaction(next_tx());
    first
        .modification_mut()
        .write(&path(&["people"]), Node::container())
        .unwrap();

    let mut second = store.new_read_write_transaction(next_tx());
    second
        .modification_mut()
        .write(&path(&["cars", "car", "optima"]), Node::leaf(json!(1)))
        .unwrap();

    let mut first_cohort = store.finish_transaction(first);
    first_cohort.can_commit().unwrap();
    first_cohort.pre_commit().unwrap();
    first_cohort.commit().unwrap();

    // Disjoint subtrees: still valid against the advanced store version.
    let mut second_cohort = store.finish_transaction(second);
    second_cohort.can_commit().unwrap();
    second_cohort.pre_commit().unwrap();
    second_cohort.commit().unwrap();

    let snapshot = store.current_snapshot();
    assert_eq!(snapshot.version().0, 3);
    assert!(snapshot.read_node(&path(&["people"])).is_some());
    assert!(snapshot.read_node(&path(&["cars", "car", "optima"])).is_some());
    assert!(snapshot.read_node(&path(&["cars", "car", "altima"])).is_some());
}

#[test]
fn test_retry_after_conflict_succeeds() {
    let store = test_store();
    seed_cars(&store);

    let mut loser = store.new_read_write_transaction(next_tx());
    loser
        .modification_mut()
        .write(&path(&["cars", "car", "altima"]), Node::leaf(json!({"price": 300})))
        .unwrap();

    commit_write(
        &store,
        &path(&["cars", "car", "altima"]),
        Node::leaf(json!({"price": 200})),
    );

    let mut loser_cohort = store.finish_transaction(loser);
    assert!(loser_cohort.can_commit().is_err());

    // A fresh transaction over the new base goes through.
    commit_write(
        &store,
        &path(&["cars", "car", "altima"]),
        Node::leaf(json!({"price": 300})),
    );
    assert_eq!(
        store
            .current_snapshot()
            .read_node(&path(&["cars", "car", "altima"]))
            .unwrap()
            .value(),
        Some(&json!({"price": 300}))
    );
}

// --- Protocol violations ---

#[test]
fn test_commit_before_pre_commit_fails() {
    let store = test_store();

    let mut tx = store.new_read_write_transaction(next_tx());
    tx.modification_mut()
        .write(&path(&["a"]), Node::leaf(json!(1)))
        .unwrap();
    let mut cohort = store.finish_transaction(tx);
    cohort.can_commit().unwrap();

    let err = cohort.commit().unwrap_err();
    assert!(matches!(err, StoreError::ProtocolViolation { .. }));
    assert_eq!(cohort.state(), CohortState::Failed);

    // The store was never touched.
    assert_eq!(store.current_snapshot().version().0, 0);
}

#[test]
fn test_double_pre_commit_fails() {
    let store = test_store();

    let mut tx = store.new_read_write_transaction(next_tx());
    tx.modification_mut()
        .write(&path(&["a"]), Node::leaf(json!(1)))
        .unwrap();
    let mut cohort = store.finish_transaction(tx);
    cohort.can_commit().unwrap();
    cohort.pre_commit().unwrap();
    assert!(cohort.candidate().is_some());

    let err = cohort.pre_commit().unwrap_err();
    assert!(matches!(err, StoreError::ProtocolViolation { .. }));
    assert_eq!(cohort.state(), CohortState::Failed);
}

#[test]
fn test_can_commit_twice_fails() {
    let store = test_store();

    let tx = store.new_read_write_transaction(next_tx());
    let mut cohort = store.finish_transaction(tx);
    cohort.can_commit().unwrap();

    assert!(matches!(
        cohort.can_commit(),
        Err(StoreError::ProtocolViolation { .. })
    ));
}

// --- Abort and discard ---

#[test]
fn test_abort_before_commit_is_clean() {
    let store = test_store();
    seed_cars(&store);
    let before = store.current_snapshot();

    let mut tx = store.new_read_write_transaction(next_tx());
    tx.modification_mut().delete(&path(&["cars"])).unwrap();
    let mut cohort = store.finish_transaction(tx);
    cohort.can_commit().unwrap();
    cohort.pre_commit().unwrap();
    cohort.abort();
    assert_eq!(cohort.state(), CohortState::Aborted);

    assert_eq!(store.current_snapshot().version(), before.version());
    assert!(store.current_snapshot().read_node(&path(&["cars"])).is_some());
}

#[test]
fn test_discarded_transaction_has_no_effect() {
    let store = test_store();
    seed_cars(&store);
    let version = store.current_snapshot().version();

    {
        let mut tx = store.new_read_write_transaction(next_tx());
        tx.modification_mut().delete(&path(&["cars"])).unwrap();
        // Dropped without ever reaching the commit pipeline.
    }

    assert_eq!(store.current_snapshot().version(), version);
}

#[test]
fn test_empty_transaction_commits_with_empty_candidate() {
    let store = test_store();

    let tx = store.new_read_write_transaction(next_tx());
    let mut cohort = store.finish_transaction(tx);
    cohort.can_commit().unwrap();
    cohort.pre_commit().unwrap();
    assert!(cohort.candidate().unwrap().is_empty());
    cohort.commit().unwrap();

    // The version still advances by exactly one.
    assert_eq!(store.current_snapshot().version().0, 1);
}
