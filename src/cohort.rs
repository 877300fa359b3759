//! Multi-phase commit coordination for a single transaction.

use crate::candidate::{diff, Candidate};
use crate::error::{Result, StoreError};
use crate::modification::Modification;
use crate::store::TreeStore;
use crate::tree::Snapshot;
use crate::types::{Path, TransactionId};
use tracing::warn;

/// Where a cohort is in the commit protocol.
///
/// The protocol's in-flight pending states are transient within each
/// synchronous phase call and are not observable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CohortState {
    /// Sealed, not yet validated.
    Ready,
    /// Validation passed.
    CanCommitted,
    /// Candidate materialized, not yet published.
    PreCommitted,
    /// Applied to the store.
    Committed,
    /// Validation found a conflict; the transaction must be retried.
    Aborted,
    /// Protocol misuse or apply failure. Terminal.
    Failed,
}

impl CohortState {
    pub fn name(self) -> &'static str {
        match self {
            CohortState::Ready => "Ready",
            CohortState::CanCommitted => "CanCommitted",
            CohortState::PreCommitted => "PreCommitted",
            CohortState::Committed => "Committed",
            CohortState::Aborted => "Aborted",
            CohortState::Failed => "Failed",
        }
    }
}

/// Drives one transaction through canCommit → preCommit → commit against a
/// store. Single-use: a cohort that aborted or failed cannot be revived.
///
/// The store assumes at most one cohort is inside the commit pipeline at a
/// time; serializing the pipeline is the caller's responsibility (see the
/// crate-level concurrency notes).
pub struct Cohort<'a> {
    store: &'a TreeStore,
    transaction_id: TransactionId,
    modification: Modification,
    candidate: Option<Candidate>,
    state: CohortState,
}

impl<'a> Cohort<'a> {
    pub(crate) fn new(
        store: &'a TreeStore,
        transaction_id: TransactionId,
        modification: Modification,
    ) -> Self {
        Cohort {
            store,
            transaction_id,
            modification,
            candidate: None,
            state: CohortState::Ready,
        }
    }

    pub fn state(&self) -> CohortState {
        self.state
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// The candidate produced by `pre_commit`, if that phase has run.
    pub fn candidate(&self) -> Option<&Candidate> {
        self.candidate.as_ref()
    }

    /// Validate the transaction against the store's current state.
    ///
    /// On conflict the cohort moves to `Aborted` and no further phase is
    /// reachable; the caller retries with a fresh transaction.
    pub fn can_commit(&mut self) -> Result<()> {
        self.expect_state(CohortState::Ready)?;
        if let Err(err) = self.store.ensure_usable() {
            self.state = CohortState::Failed;
            return Err(err);
        }
        match self
            .modification
            .validate_against(&self.store.current_snapshot())
        {
            Ok(()) => {
                self.state = CohortState::CanCommitted;
                Ok(())
            }
            Err(err) => {
                warn!(
                    transaction = %self.transaction_id,
                    error = %err,
                    "commit validation failed"
                );
                self.state = CohortState::Aborted;
                Err(err)
            }
        }
    }

    /// Materialize the candidate without publishing it to the store.
    ///
    /// From here the candidate is available via [`Cohort::candidate`], e.g.
    /// for a replication layer that ships the diff before the final commit.
    pub fn pre_commit(&mut self) -> Result<()> {
        self.expect_state(CohortState::CanCommitted)?;
        let after = match self.modification.materialize() {
            Ok(after) => after,
            Err(err) => {
                self.state = CohortState::Failed;
                return Err(err);
            }
        };
        self.candidate = Some(diff(
            self.modification.base().root(),
            &after,
            Path::root(),
        ));
        self.state = CohortState::PreCommitted;
        Ok(())
    }

    /// Apply the candidate to the store and trigger notification.
    ///
    /// No re-validation happens here: validation already accounted for
    /// conflicts, so the commit succeeds even if the store version moved
    /// since `can_commit`. Once application begins the store update is the
    /// durable side effect; there is no turning back.
    pub fn commit(&mut self) -> Result<Snapshot> {
        self.expect_state(CohortState::PreCommitted)?;
        let candidate = match self.candidate.clone() {
            Some(candidate) => candidate,
            None => {
                self.state = CohortState::Failed;
                return Err(StoreError::ProtocolViolation {
                    expected: "PreCommitted",
                    actual: "PreCommitted without candidate",
                });
            }
        };
        match self.store.commit_candidate(self.transaction_id, &candidate) {
            Ok(snapshot) => {
                self.state = CohortState::Committed;
                Ok(snapshot)
            }
            Err(err) => {
                self.state = CohortState::Failed;
                Err(err)
            }
        }
    }

    /// Abandon the transaction. Clean before `commit`; a no-op on a
    /// terminal cohort.
    pub fn abort(&mut self) {
        if matches!(
            self.state,
            CohortState::Ready | CohortState::CanCommitted | CohortState::PreCommitted
        ) {
            self.state = CohortState::Aborted;
        }
    }

    fn expect_state(&mut self, expected: CohortState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            let actual = self.state;
            self.state = CohortState::Failed;
            Err(StoreError::ProtocolViolation {
                expected: expected.name(),
                actual: actual.name(),
            })
        }
    }
}
