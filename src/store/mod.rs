//! The storage collaborator.
//!
//! The engine never talks to a database directly. It opens a [`UnitOfWork`]
//! on a [`Store`], performs every read and write of one operation through the
//! [`Transaction`] handle, and completes the unit of work, which commits on
//! success and rolls back on any error. Dropping a unit of work without
//! completing it (e.g. because the request was cancelled) also rolls back.
//!
//! Two implementations exist: [`MemoryStore`] (one global lock, used by tests
//! and local development) and [`crate::model::mongodb::MongoStore`].

mod memory;
mod unit_of_work;

pub use memory::{MemoryStore, Tables};
pub use unit_of_work::UnitOfWork;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    common::{
        ballot::{BallotId, BallotStatus},
        election::{DelegateId, ElectionId, ElectionStatus},
    },
    db::{
        ActiveElection, AuditEntry, Ballot, Candidate, CastVote, Delegate, Election, NewBallot,
        NewCandidate, NewDelegate, NewElection, NewPosition, Position,
    },
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures reported by a storage collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected a write.
    #[error("Duplicate key: {0}")]
    Duplicate(String),
    /// The transaction lost a race or timed out waiting for a lock. Safe to retry.
    #[error("Transaction conflict: {0}")]
    Conflict(String),
    /// Anything else: connection loss, malformed documents, ...
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(err.into())
    }
}

/// Something that can open transactions.
#[rocket::async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction. `label` names the operation in logs.
    async fn begin(&self, label: &'static str) -> StoreResult<Box<dyn Transaction>>;
}

/// The activity log. Entries are appended inside the transaction of the change
/// they describe, so they commit or vanish together with it.
#[rocket::async_trait]
pub trait AuditLog: Send {
    async fn append(&mut self, entry: AuditEntry) -> StoreResult<()>;
}

/// An open transaction.
///
/// Writes made through a transaction are invisible to others until
/// [`Transaction::commit`] succeeds. Writes that take an `expected` status are
/// compare-and-set: they report `false` without writing if the stored row is
/// no longer in that status.
#[rocket::async_trait]
pub trait Transaction: AuditLog {
    async fn elections(&mut self) -> StoreResult<Vec<Election>>;
    async fn election(&mut self, id: ElectionId) -> StoreResult<Option<Election>>;
    async fn insert_election(&mut self, election: &NewElection) -> StoreResult<Election>;
    async fn replace_election(
        &mut self,
        election: &Election,
        expected: ElectionStatus,
    ) -> StoreResult<bool>;
    /// Claim the election's row for this transaction, without changing its
    /// fields, if it is still in `expected`.
    ///
    /// Any concurrent transaction writing the same election then conflicts
    /// with this one, so the status cannot change before commit.
    async fn lock_election(&mut self, id: ElectionId, expected: ElectionStatus)
        -> StoreResult<bool>;

    async fn active_election(&mut self) -> StoreResult<ActiveElection>;
    async fn save_active_election(&mut self, pointer: &ActiveElection) -> StoreResult<()>;

    /// Positions of an election, in ID order.
    async fn positions(&mut self, election_id: ElectionId) -> StoreResult<Vec<Position>>;
    async fn insert_position(&mut self, position: &NewPosition) -> StoreResult<Position>;
    /// Candidates of an election, in ID order.
    async fn candidates(&mut self, election_id: ElectionId) -> StoreResult<Vec<Candidate>>;
    async fn insert_candidate(&mut self, candidate: &NewCandidate) -> StoreResult<Candidate>;

    async fn count_delegates(&mut self, election_id: ElectionId) -> StoreResult<u64>;
    async fn delegate_by_control_number(
        &mut self,
        election_id: ElectionId,
        control_number: &str,
    ) -> StoreResult<Option<Delegate>>;
    /// Fails with [`StoreError::Duplicate`] if the control number is taken in the election.
    async fn insert_delegate(&mut self, delegate: &NewDelegate) -> StoreResult<Delegate>;
    async fn set_delegate_voted(
        &mut self,
        delegate_id: DelegateId,
        voted_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;
    /// Claim the row of every delegate in the election, returning how many
    /// were claimed.
    ///
    /// Casting and voiding write the delegate's row, so a transaction in
    /// flight for any of them conflicts with this one.
    async fn lock_delegates(&mut self, election_id: ElectionId) -> StoreResult<u64>;

    /// The delegate's non-void ballot for the election, if any.
    async fn live_ballot(
        &mut self,
        delegate_id: DelegateId,
        election_id: ElectionId,
    ) -> StoreResult<Option<Ballot>>;
    /// Fails with [`StoreError::Duplicate`] if the delegate already has a live ballot.
    async fn insert_ballot(&mut self, ballot: &NewBallot) -> StoreResult<Ballot>;
    /// Write the ballot's status and timestamps.
    async fn update_ballot(&mut self, ballot: &Ballot, expected: BallotStatus) -> StoreResult<bool>;

    /// Fails with [`StoreError::Duplicate`] if a selection is already recorded.
    async fn insert_cast_votes(&mut self, votes: &[CastVote]) -> StoreResult<()>;
    /// Selections on a ballot that are not soft-deleted.
    async fn cast_votes(&mut self, ballot_id: BallotId) -> StoreResult<Vec<CastVote>>;
    /// Mark every selection on a ballot deleted, returning how many were marked.
    async fn soft_delete_cast_votes(
        &mut self,
        ballot_id: BallotId,
        at: DateTime<Utc>,
    ) -> StoreResult<u64>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
