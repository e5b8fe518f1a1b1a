use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::trace;
use rocket::tokio::{
    sync::{Mutex, OwnedMutexGuard},
    time::timeout,
};

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

use super::{AuditLog, Store, StoreError, StoreResult, Transaction};

/// How long a transaction waits for the lock unless configured otherwise.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a [`MemoryStore`] holds.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub elections: BTreeMap<ElectionId, Election>,
    pub active_election: ActiveElection,
    pub positions: BTreeMap<u32, Position>,
    pub candidates: BTreeMap<u32, Candidate>,
    pub delegates: BTreeMap<DelegateId, Delegate>,
    pub ballots: BTreeMap<BallotId, Ballot>,
    pub cast_votes: Vec<CastVote>,
    pub audit_log: Vec<AuditEntry>,
    counters: HashMap<&'static str, u32>,
}

impl Tables {
    fn next_id(&mut self, collection: &'static str) -> u32 {
        let next = self.counters.entry(collection).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    /// Selections on a ballot, including soft-deleted ones.
    pub fn votes_on(&self, ballot_id: BallotId) -> impl Iterator<Item = &CastVote> {
        self.cast_votes
            .iter()
            .filter(move |vote| vote.ballot_id == ballot_id)
    }
}

/// An in-process store.
///
/// Transactions are fully serialised: `begin` takes a single lock, the
/// transaction works on a private copy of the tables, and `commit` swaps the
/// copy in. Rolling back (or dropping the transaction) discards the copy and
/// releases the lock.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// A store whose transactions give up with [`StoreError::Conflict`] after
    /// waiting `lock_timeout` for the lock.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: Default::default(),
            lock_timeout,
        }
    }

    /// Another handle on the same tables, whose transactions wait at most
    /// `lock_timeout` for the lock.
    pub fn shared_with_lock_timeout(&self, lock_timeout: Duration) -> Self {
        Self {
            tables: self.tables.clone(),
            lock_timeout,
        }
    }

    /// A copy of the committed state.
    pub async fn snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn begin(&self, label: &'static str) -> StoreResult<Box<dyn Transaction>> {
        let guard = timeout(self.lock_timeout, self.tables.clone().lock_owned())
            .await
            .map_err(|_| {
                StoreError::Conflict(format!(
                    "'{label}' timed out after {:?} waiting for the store lock",
                    self.lock_timeout
                ))
            })?;
        trace!("Began in-memory transaction '{label}'");
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[rocket::async_trait]
impl AuditLog for MemoryTransaction {
    async fn append(&mut self, entry: AuditEntry) -> StoreResult<()> {
        self.working.audit_log.push(entry);
        Ok(())
    }
}

#[rocket::async_trait]
impl Transaction for MemoryTransaction {
    async fn elections(&mut self) -> StoreResult<Vec<Election>> {
        Ok(self.working.elections.values().cloned().collect())
    }

    async fn election(&mut self, id: ElectionId) -> StoreResult<Option<Election>> {
        Ok(self.working.elections.get(&id).cloned())
    }

    async fn insert_election(&mut self, election: &NewElection) -> StoreResult<Election> {
        let id = self.working.next_id("elections");
        let election = Election {
            id,
            election: election.clone(),
        };
        self.working.elections.insert(id, election.clone());
        Ok(election)
    }

    async fn replace_election(
        &mut self,
        election: &Election,
        expected: ElectionStatus,
    ) -> StoreResult<bool> {
        match self.working.elections.get_mut(&election.id) {
            Some(stored) if stored.status == expected => {
                *stored = election.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn lock_election(
        &mut self,
        id: ElectionId,
        expected: ElectionStatus,
    ) -> StoreResult<bool> {
        // The store lock already excludes every other transaction.
        Ok(matches!(self.working.elections.get(&id), Some(e) if e.status == expected))
    }

    async fn active_election(&mut self) -> StoreResult<ActiveElection> {
        Ok(self.working.active_election.clone())
    }

    async fn save_active_election(&mut self, pointer: &ActiveElection) -> StoreResult<()> {
        self.working.active_election = pointer.clone();
        Ok(())
    }

    async fn positions(&mut self, election_id: ElectionId) -> StoreResult<Vec<Position>> {
        Ok(self
            .working
            .positions
            .values()
            .filter(|p| p.election_id == election_id)
            .cloned()
            .collect())
    }

    async fn insert_position(&mut self, position: &NewPosition) -> StoreResult<Position> {
        let id = self.working.next_id("positions");
        let position = Position {
            id,
            position: position.clone(),
        };
        self.working.positions.insert(id, position.clone());
        Ok(position)
    }

    async fn candidates(&mut self, election_id: ElectionId) -> StoreResult<Vec<Candidate>> {
        Ok(self
            .working
            .candidates
            .values()
            .filter(|c| c.election_id == election_id)
            .cloned()
            .collect())
    }

    async fn insert_candidate(&mut self, candidate: &NewCandidate) -> StoreResult<Candidate> {
        let id = self.working.next_id("candidates");
        let candidate = Candidate {
            id,
            candidate: candidate.clone(),
        };
        self.working.candidates.insert(id, candidate.clone());
        Ok(candidate)
    }

    async fn count_delegates(&mut self, election_id: ElectionId) -> StoreResult<u64> {
        let count = self
            .working
            .delegates
            .values()
            .filter(|d| d.election_id == election_id)
            .count();
        Ok(count as u64)
    }

    async fn delegate_by_control_number(
        &mut self,
        election_id: ElectionId,
        control_number: &str,
    ) -> StoreResult<Option<Delegate>> {
        Ok(self
            .working
            .delegates
            .values()
            .find(|d| d.election_id == election_id && d.control_number == control_number)
            .cloned())
    }

    async fn insert_delegate(&mut self, delegate: &NewDelegate) -> StoreResult<Delegate> {
        let taken = self.working.delegates.values().any(|d| {
            d.election_id == delegate.election_id && d.control_number == delegate.control_number
        });
        if taken {
            return Err(StoreError::Duplicate(format!(
                "delegates: control number {} in election {}",
                delegate.control_number, delegate.election_id
            )));
        }
        let id = self.working.next_id("delegates");
        let delegate = Delegate {
            id,
            delegate: delegate.clone(),
        };
        self.working.delegates.insert(id, delegate.clone());
        Ok(delegate)
    }

    async fn set_delegate_voted(
        &mut self,
        delegate_id: DelegateId,
        voted_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        match self.working.delegates.get_mut(&delegate_id) {
            Some(delegate) => {
                delegate.voted_at = voted_at;
                Ok(())
            }
            None => Err(StoreError::backend(format!(
                "delegate {delegate_id} vanished"
            ))),
        }
    }

    async fn lock_delegates(&mut self, election_id: ElectionId) -> StoreResult<u64> {
        self.count_delegates(election_id).await
    }

    async fn live_ballot(
        &mut self,
        delegate_id: DelegateId,
        election_id: ElectionId,
    ) -> StoreResult<Option<Ballot>> {
        Ok(self
            .working
            .ballots
            .values()
            .find(|b| {
                b.delegate_id == delegate_id && b.election_id == election_id && b.status.is_live()
            })
            .cloned())
    }

    async fn insert_ballot(&mut self, ballot: &NewBallot) -> StoreResult<Ballot> {
        if ballot.status.is_live() {
            let occupied = self.working.ballots.values().any(|b| {
                b.delegate_id == ballot.delegate_id
                    && b.election_id == ballot.election_id
                    && b.status.is_live()
            });
            if occupied {
                return Err(StoreError::Duplicate(format!(
                    "ballots: delegate {} in election {}",
                    ballot.delegate_id, ballot.election_id
                )));
            }
        }
        let id = self.working.next_id("ballots");
        let ballot = Ballot {
            id,
            ballot: ballot.clone(),
        };
        self.working.ballots.insert(id, ballot.clone());
        Ok(ballot)
    }

    async fn update_ballot(&mut self, ballot: &Ballot, expected: BallotStatus) -> StoreResult<bool> {
        match self.working.ballots.get_mut(&ballot.id) {
            Some(stored) if stored.status == expected => {
                *stored = ballot.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_cast_votes(&mut self, votes: &[CastVote]) -> StoreResult<()> {
        for vote in votes {
            let recorded = self.working.cast_votes.iter().any(|v| {
                !v.is_deleted()
                    && v.ballot_id == vote.ballot_id
                    && v.position_id == vote.position_id
                    && v.candidate_id == vote.candidate_id
            });
            if recorded {
                return Err(StoreError::Duplicate(format!(
                    "cast_votes: ballot {} position {} candidate {}",
                    vote.ballot_id, vote.position_id, vote.candidate_id
                )));
            }
            self.working.cast_votes.push(vote.clone());
        }
        Ok(())
    }

    async fn cast_votes(&mut self, ballot_id: BallotId) -> StoreResult<Vec<CastVote>> {
        Ok(self
            .working
            .votes_on(ballot_id)
            .filter(|v| !v.is_deleted())
            .cloned()
            .collect())
    }

    async fn soft_delete_cast_votes(
        &mut self,
        ballot_id: BallotId,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut deleted = 0;
        for vote in self.working.cast_votes.iter_mut() {
            if vote.ballot_id == ballot_id && !vote.is_deleted() {
                vote.deleted_at = Some(at);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::db::{AuditAction, ElectionCore};
    use crate::model::common::actor::Actor;

    fn entry() -> AuditEntry {
        AuditEntry::new(
            AuditAction::ElectionCreated,
            "election",
            1,
            "test",
            &Actor::example(),
        )
    }

    #[rocket::async_test]
    async fn commit_publishes_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin("test").await.unwrap();
        let election = tx.insert_election(&ElectionCore::example()).await.unwrap();
        tx.append(entry()).await.unwrap();
        tx.commit().await.unwrap();

        let tables = store.snapshot().await;
        assert_eq!(tables.elections.get(&election.id), Some(&election));
        assert_eq!(tables.audit_log.len(), 1);
    }

    #[rocket::async_test]
    async fn rollback_and_drop_discard_writes() {
        let store = MemoryStore::new();

        let mut tx = store.begin("rolled back").await.unwrap();
        tx.insert_election(&ElectionCore::example()).await.unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin("dropped").await.unwrap();
        tx.insert_election(&ElectionCore::example()).await.unwrap();
        tx.append(entry()).await.unwrap();
        drop(tx);

        let tables = store.snapshot().await;
        assert!(tables.elections.is_empty());
        assert!(tables.audit_log.is_empty());
    }

    #[rocket::async_test]
    async fn lock_timeout_is_a_conflict() {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(20));
        let _held = store.begin("holder").await.unwrap();
        let result = store.begin("waiter").await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[rocket::async_test]
    async fn one_live_ballot_per_delegate() {
        let store = MemoryStore::new();
        let mut tx = store.begin("test").await.unwrap();
        let now = crate::model::common::now();

        let mut first = tx.insert_ballot(&NewBallot::issue(7, 1, now)).await.unwrap();
        let second = tx.insert_ballot(&NewBallot::issue(7, 1, now)).await;
        assert!(matches!(second, Err(StoreError::Duplicate(_))));

        // Voiding the first frees the slot.
        first.status = BallotStatus::Void;
        assert!(tx.update_ballot(&first, BallotStatus::Issued).await.unwrap());
        tx.insert_ballot(&NewBallot::issue(7, 1, now)).await.unwrap();
    }

    #[rocket::async_test]
    async fn ballot_updates_are_compare_and_set() {
        let store = MemoryStore::new();
        let mut tx = store.begin("test").await.unwrap();
        let now = crate::model::common::now();

        let mut ballot = tx.insert_ballot(&NewBallot::issue(1, 1, now)).await.unwrap();
        ballot.status = BallotStatus::Cast;
        assert!(tx.update_ballot(&ballot, BallotStatus::Issued).await.unwrap());
        assert!(!tx.update_ballot(&ballot, BallotStatus::Issued).await.unwrap());
    }

    #[rocket::async_test]
    async fn election_locks_check_the_status() {
        let store = MemoryStore::new();
        let mut tx = store.begin("test").await.unwrap();
        let election = tx.insert_election(&ElectionCore::example()).await.unwrap();

        assert!(tx
            .lock_election(election.id, ElectionStatus::Scheduled)
            .await
            .unwrap());
        assert!(!tx
            .lock_election(election.id, ElectionStatus::Started)
            .await
            .unwrap());
        assert!(!tx.lock_election(99, ElectionStatus::Scheduled).await.unwrap());
        assert_eq!(tx.lock_delegates(election.id).await.unwrap(), 0);
    }

    #[rocket::async_test]
    async fn ids_count_up_per_collection() {
        let store = MemoryStore::new();
        let mut tx = store.begin("test").await.unwrap();
        let first = tx.insert_election(&ElectionCore::example()).await.unwrap();
        let second = tx.insert_election(&ElectionCore::example()).await.unwrap();
        let position = tx
            .insert_position(&NewPosition {
                election_id: first.id,
                title: "Chair".to_string(),
                max_candidates: 1,
                term: None,
            })
            .await
            .unwrap();
        assert_eq!((first.id, second.id, position.id), (1, 2, 1));
    }
}
