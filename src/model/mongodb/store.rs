use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use mongodb::{
    bson::{doc, Bson, DateTime as BsonDateTime, Document},
    error::Error as DbError,
    options::{
        Acknowledgment, FindOptions, ReadConcern, ReplaceOptions, TransactionOptions,
        UpdateOptions, WriteConcern,
    },
    Client, ClientSession, Database, SessionCursor,
};
use serde::de::DeserializeOwned;

use crate::model::{
    common::{
        ballot::{BallotId, BallotStatus},
        election::{DelegateId, ElectionId, ElectionStatus},
    },
    db::{
        ActiveElection, AuditEntry, Ballot, Candidate, CastVote, Delegate, Election, NewBallot,
        NewCandidate, NewDelegate, NewElection, NewPosition, Position, ACTIVE_ELECTION_ID,
    },
};
use crate::store::{AuditLog, Store, StoreResult, Transaction};

use super::{
    collection::{BALLOTS, CANDIDATES, COUNTED, DELEGATES, ELECTIONS, POSITIONS},
    ensure_id_counters_exist, ensure_indexes_exist, is_unknown_commit_result, u32_id_filter, Coll,
    Counter, StoredBallot, StoredVote,
};

/// How often a commit whose outcome is unknown is retried before giving up.
/// Retrying a commit is safe: the server applies a transaction at most once.
const COMMIT_RETRIES: u32 = 3;

/// A store backed by MongoDB multi-document transactions.
///
/// Requires a replica set (or sharded cluster); standalone servers do not
/// support transactions.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
    max_commit_time: Option<Duration>,
}

impl MongoStore {
    /// Wrap the named database, creating indexes, ID counters and the active
    /// election pointer as needed.
    pub async fn prepare(client: Client, db_name: &str) -> Result<Self, DbError> {
        let db = client.database(db_name);
        ensure_indexes_exist(&db).await?;
        ensure_id_counters_exist(&Coll::from_db(&db), &COUNTED).await?;

        // Create the pointer row, unset, if this is a fresh database.
        let unset = doc! {
            "$setOnInsert": {
                "election_id": Bson::Null,
                "updated_by": Bson::Null,
                "updated_at": Bson::Null,
            }
        };
        Coll::<ActiveElection>::from_db(&db)
            .update_one(
                u32_id_filter(ACTIVE_ELECTION_ID),
                unset,
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(Self {
            client,
            db,
            max_commit_time: None,
        })
    }

    /// Bound how long a commit may wait on locks before the server aborts it.
    pub fn with_max_commit_time(self, max_commit_time: Duration) -> Self {
        Self {
            max_commit_time: Some(max_commit_time),
            ..self
        }
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn begin(&self, label: &'static str) -> StoreResult<Box<dyn Transaction>> {
        let mut session = self.client.start_session(None).await?;
        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .max_commit_time(self.max_commit_time)
            .build();
        session.start_transaction(options).await?;
        trace!("Began MongoDB transaction '{label}'");
        Ok(Box::new(MongoTransaction::new(label, session, &self.db)))
    }
}

struct MongoTransaction {
    label: &'static str,
    session: ClientSession,
    elections: Coll<Election>,
    active_election: Coll<ActiveElection>,
    positions: Coll<Position>,
    candidates: Coll<Candidate>,
    delegates: Coll<Delegate>,
    ballots: Coll<StoredBallot>,
    cast_votes: Coll<StoredVote>,
    audit_log: Coll<AuditEntry>,
    counters: Coll<Counter>,
}

impl MongoTransaction {
    fn new(label: &'static str, session: ClientSession, db: &Database) -> Self {
        Self {
            label,
            session,
            elections: Coll::from_db(db),
            active_election: Coll::from_db(db),
            positions: Coll::from_db(db),
            candidates: Coll::from_db(db),
            delegates: Coll::from_db(db),
            ballots: Coll::from_db(db),
            cast_votes: Coll::from_db(db),
            audit_log: Coll::from_db(db),
            counters: Coll::from_db(db),
        }
    }

    async fn next_id(&self, collection: &str) -> StoreResult<u32> {
        Counter::next(&self.counters, collection).await
    }
}

/// Drain a cursor inside the session that opened it.
async fn collect<T: DeserializeOwned>(
    mut cursor: SessionCursor<T>,
    session: &mut ClientSession,
) -> StoreResult<Vec<T>> {
    let mut items = Vec::new();
    while let Some(item) = cursor.next(session).await {
        items.push(item?);
    }
    Ok(items)
}

fn by_id() -> FindOptions {
    FindOptions::builder().sort(doc! {"_id": 1}).build()
}

/// An update that changes nothing the application reads, but still counts as
/// a write for conflict detection.
fn claim() -> Document {
    doc! { "$inc": { "revision": 1_i64 } }
}

fn live_ballot_filter(delegate_id: DelegateId, election_id: ElectionId) -> Document {
    doc! {
        "delegate_id": delegate_id,
        "election_id": election_id,
        "live": true,
    }
}

#[rocket::async_trait]
impl AuditLog for MongoTransaction {
    async fn append(&mut self, entry: AuditEntry) -> StoreResult<()> {
        self.audit_log
            .insert_one_with_session(entry, None, &mut self.session)
            .await?;
        Ok(())
    }
}

#[rocket::async_trait]
impl Transaction for MongoTransaction {
    async fn elections(&mut self) -> StoreResult<Vec<Election>> {
        let cursor = self
            .elections
            .find_with_session(None, by_id(), &mut self.session)
            .await?;
        collect(cursor, &mut self.session).await
    }

    async fn election(&mut self, id: ElectionId) -> StoreResult<Option<Election>> {
        Ok(self
            .elections
            .find_one_with_session(u32_id_filter(id), None, &mut self.session)
            .await?)
    }

    async fn insert_election(&mut self, election: &NewElection) -> StoreResult<Election> {
        let id = self.next_id(ELECTIONS).await?;
        let election = Election {
            id,
            election: election.clone(),
        };
        self.elections
            .insert_one_with_session(&election, None, &mut self.session)
            .await?;
        Ok(election)
    }

    async fn replace_election(
        &mut self,
        election: &Election,
        expected: ElectionStatus,
    ) -> StoreResult<bool> {
        let filter = doc! {
            "_id": election.id,
            "status": expected,
        };
        let result = self
            .elections
            .replace_one_with_session(filter, election, None, &mut self.session)
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn lock_election(
        &mut self,
        id: ElectionId,
        expected: ElectionStatus,
    ) -> StoreResult<bool> {
        let filter = doc! {
            "_id": id,
            "status": expected,
        };
        let result = self
            .elections
            .update_one_with_session(filter, claim(), None, &mut self.session)
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn active_election(&mut self) -> StoreResult<ActiveElection> {
        let pointer = self
            .active_election
            .find_one_with_session(u32_id_filter(ACTIVE_ELECTION_ID), None, &mut self.session)
            .await?;
        Ok(pointer.unwrap_or_default())
    }

    async fn save_active_election(&mut self, pointer: &ActiveElection) -> StoreResult<()> {
        let upsert = ReplaceOptions::builder().upsert(true).build();
        self.active_election
            .replace_one_with_session(u32_id_filter(pointer.id), pointer, upsert, &mut self.session)
            .await?;
        Ok(())
    }

    async fn positions(&mut self, election_id: ElectionId) -> StoreResult<Vec<Position>> {
        let cursor = self
            .positions
            .find_with_session(doc! {"election_id": election_id}, by_id(), &mut self.session)
            .await?;
        collect(cursor, &mut self.session).await
    }

    async fn insert_position(&mut self, position: &NewPosition) -> StoreResult<Position> {
        let id = self.next_id(POSITIONS).await?;
        let position = Position {
            id,
            position: position.clone(),
        };
        self.positions
            .insert_one_with_session(&position, None, &mut self.session)
            .await?;
        Ok(position)
    }

    async fn candidates(&mut self, election_id: ElectionId) -> StoreResult<Vec<Candidate>> {
        let cursor = self
            .candidates
            .find_with_session(doc! {"election_id": election_id}, by_id(), &mut self.session)
            .await?;
        collect(cursor, &mut self.session).await
    }

    async fn insert_candidate(&mut self, candidate: &NewCandidate) -> StoreResult<Candidate> {
        let id = self.next_id(CANDIDATES).await?;
        let candidate = Candidate {
            id,
            candidate: candidate.clone(),
        };
        self.candidates
            .insert_one_with_session(&candidate, None, &mut self.session)
            .await?;
        Ok(candidate)
    }

    async fn count_delegates(&mut self, election_id: ElectionId) -> StoreResult<u64> {
        Ok(self
            .delegates
            .count_documents_with_session(
                doc! {"election_id": election_id},
                None,
                &mut self.session,
            )
            .await?)
    }

    async fn delegate_by_control_number(
        &mut self,
        election_id: ElectionId,
        control_number: &str,
    ) -> StoreResult<Option<Delegate>> {
        let filter = doc! {
            "election_id": election_id,
            "control_number": control_number,
        };
        Ok(self
            .delegates
            .find_one_with_session(filter, None, &mut self.session)
            .await?)
    }

    async fn insert_delegate(&mut self, delegate: &NewDelegate) -> StoreResult<Delegate> {
        let id = self.next_id(DELEGATES).await?;
        let delegate = Delegate {
            id,
            delegate: delegate.clone(),
        };
        self.delegates
            .insert_one_with_session(&delegate, None, &mut self.session)
            .await?;
        Ok(delegate)
    }

    async fn set_delegate_voted(
        &mut self,
        delegate_id: DelegateId,
        voted_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let update = doc! {
            "$set": { "voted_at": voted_at.map(BsonDateTime::from_chrono) }
        };
        self.delegates
            .update_one_with_session(u32_id_filter(delegate_id), update, None, &mut self.session)
            .await?;
        Ok(())
    }

    async fn lock_delegates(&mut self, election_id: ElectionId) -> StoreResult<u64> {
        let result = self
            .delegates
            .update_many_with_session(
                doc! {"election_id": election_id},
                claim(),
                None,
                &mut self.session,
            )
            .await?;
        Ok(result.matched_count)
    }

    async fn live_ballot(
        &mut self,
        delegate_id: DelegateId,
        election_id: ElectionId,
    ) -> StoreResult<Option<Ballot>> {
        let stored = self
            .ballots
            .find_one_with_session(
                live_ballot_filter(delegate_id, election_id),
                None,
                &mut self.session,
            )
            .await?;
        Ok(stored.map(|stored| stored.ballot))
    }

    async fn insert_ballot(&mut self, ballot: &NewBallot) -> StoreResult<Ballot> {
        let id = self.next_id(BALLOTS).await?;
        let ballot = Ballot {
            id,
            ballot: ballot.clone(),
        };
        self.ballots
            .insert_one_with_session(StoredBallot::from(&ballot), None, &mut self.session)
            .await?;
        Ok(ballot)
    }

    async fn update_ballot(&mut self, ballot: &Ballot, expected: BallotStatus) -> StoreResult<bool> {
        let filter = doc! {
            "_id": ballot.id,
            "status": expected,
        };
        let result = self
            .ballots
            .replace_one_with_session(filter, StoredBallot::from(ballot), None, &mut self.session)
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn insert_cast_votes(&mut self, votes: &[CastVote]) -> StoreResult<()> {
        if votes.is_empty() {
            return Ok(());
        }
        let stored: Vec<_> = votes.iter().map(StoredVote::from).collect();
        self.cast_votes
            .insert_many_with_session(stored, None, &mut self.session)
            .await?;
        Ok(())
    }

    async fn cast_votes(&mut self, ballot_id: BallotId) -> StoreResult<Vec<CastVote>> {
        let options = FindOptions::builder()
            .sort(doc! {"position_id": 1, "candidate_id": 1})
            .build();
        let cursor = self
            .cast_votes
            .find_with_session(
                doc! {"ballot_id": ballot_id, "live": true},
                options,
                &mut self.session,
            )
            .await?;
        let stored = collect(cursor, &mut self.session).await?;
        Ok(stored.into_iter().map(|stored| stored.vote).collect())
    }

    async fn soft_delete_cast_votes(
        &mut self,
        ballot_id: BallotId,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let update = doc! {
            "$set": {
                "deleted_at": BsonDateTime::from_chrono(at),
                "live": false,
            }
        };
        let result = self
            .cast_votes
            .update_many_with_session(
                doc! {"ballot_id": ballot_id, "live": true},
                update,
                None,
                &mut self.session,
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut tx = *self;
        let mut retries = 0;
        loop {
            match tx.session.commit_transaction().await {
                Ok(()) => break,
                Err(err) if is_unknown_commit_result(&err) && retries < COMMIT_RETRIES => {
                    retries += 1;
                    warn!(
                        "Outcome of committing '{}' is unknown, retrying commit ({retries}/{COMMIT_RETRIES}): {err}",
                        tx.label
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        debug!("Committed MongoDB transaction '{}'", tx.label);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        let mut tx = *self;
        tx.session.abort_transaction().await?;
        debug!("Aborted MongoDB transaction '{}'", tx.label);
        Ok(())
    }
}

/// A store on a freshly named database, if `db_uri` is configured.
///
/// The caller is responsible for dropping the returned database.
#[cfg(test)]
pub async fn test_database() -> Option<(Database, MongoStore)> {
    let db_uri: String = rocket::Config::figment().extract_inner("db_uri").ok()?;
    let db_name = format!("coop_election_test_{}", rand::random::<u32>());
    let client = Client::with_uri_str(db_uri)
        .await
        .expect("Failed to connect to the test database");
    let store = MongoStore::prepare(client.clone(), &db_name)
        .await
        .expect("Failed to prepare the test database");
    Some((client.database(&db_name), store))
}

#[cfg(test)]
mod tests {
    use rocket::tokio;

    use super::*;
    use crate::engine::{fixtures::Seeded, Engine};
    use crate::error::Error;
    use crate::model::{
        common::{actor::Actor, now},
        db::{BallotCore, ElectionCore},
    };
    use crate::store::StoreError;

    #[test]
    fn live_ballot_filter_matches_partial_index() {
        let filter = live_ballot_filter(7, 2);
        assert!(filter.get_bool("live").unwrap());
        assert!(filter.contains_key("delegate_id"));
        assert!(filter.contains_key("election_id"));
    }

    fn votes_on(ballot_id: BallotId) -> Vec<CastVote> {
        [(1, 4), (2, 6)]
            .into_iter()
            .map(|(position_id, candidate_id)| CastVote {
                ballot_id,
                election_id: 1,
                position_id,
                candidate_id,
                cast_at: now(),
                deleted_at: None,
            })
            .collect()
    }

    async fn count(store: &MongoStore, collection: &str, filter: Document) -> u64 {
        store
            .db
            .collection::<Document>(collection)
            .count_documents(filter, None)
            .await
            .unwrap()
    }

    #[backend_test(mongo)]
    async fn only_committed_writes_are_kept(store: MongoStore) {
        let mut tx = store.begin("kept").await.unwrap();
        let kept = tx.insert_election(&ElectionCore::example()).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin("discarded").await.unwrap();
        let discarded = tx.insert_election(&ElectionCore::example()).await.unwrap();
        assert_ne!(discarded.id, kept.id);
        tx.rollback().await.unwrap();

        let mut tx = store.begin("read").await.unwrap();
        assert_eq!(tx.elections().await.unwrap(), vec![kept]);
        assert!(tx.election(discarded.id).await.unwrap().is_none());
        tx.commit().await.unwrap();
    }

    #[backend_test(mongo)]
    async fn one_live_ballot_per_delegate(store: MongoStore) {
        let mut tx = store.begin("issue").await.unwrap();
        let mut first = tx.insert_ballot(&BallotCore::issue(7, 1, now())).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin("issue again").await.unwrap();
        let err = tx
            .insert_ballot(&BallotCore::issue(7, 1, now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert!(matches!(
            Error::from(err).duplicate_as_vote("CN-000007"),
            Error::DuplicateVote(cn) if cn == "CN-000007"
        ));
        tx.rollback().await.ok();

        // A void ballot no longer occupies the delegate's slot.
        let mut tx = store.begin("void and reissue").await.unwrap();
        first.status = BallotStatus::Void;
        first.voided_at = Some(now());
        assert!(tx.update_ballot(&first, BallotStatus::Issued).await.unwrap());
        let second = tx.insert_ballot(&BallotCore::issue(7, 1, now())).await.unwrap();
        assert_eq!(tx.live_ballot(7, 1).await.unwrap(), Some(second));
        tx.commit().await.unwrap();

        assert_eq!(count(&store, BALLOTS, doc! {"live": false}).await, 1);
        assert_eq!(count(&store, BALLOTS, doc! {"live": true}).await, 1);
    }

    #[backend_test(mongo)]
    async fn soft_deleted_votes_are_hidden_and_can_be_recast(store: MongoStore) {
        let votes = votes_on(3);
        let mut tx = store.begin("cast").await.unwrap();
        tx.insert_cast_votes(&votes).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin("cast again").await.unwrap();
        let err = tx.insert_cast_votes(&votes).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        tx.rollback().await.ok();

        let mut tx = store.begin("withdraw").await.unwrap();
        assert_eq!(tx.soft_delete_cast_votes(3, now()).await.unwrap(), 2);
        assert!(tx.cast_votes(3).await.unwrap().is_empty());
        tx.insert_cast_votes(&votes).await.unwrap();
        assert_eq!(tx.cast_votes(3).await.unwrap(), votes);
        tx.commit().await.unwrap();

        let withdrawn = doc! {"live": false, "deleted_at": {"$type": "date"}};
        assert_eq!(count(&store, "cast_votes", withdrawn).await, 2);
        assert_eq!(count(&store, "cast_votes", doc! {"live": true}).await, 2);
    }

    #[backend_test(mongo, started)]
    async fn racing_casts_by_one_delegate_have_one_winner(
        engine: Engine,
        store: MongoStore,
        seeded: Seeded,
    ) {
        let actor = Actor::example();
        let casts: Vec<_> = (0..2)
            .map(|_| {
                let engine = engine.clone();
                let submission = seeded.full_submission(0);
                let actor = actor.clone();
                tokio::spawn(async move { engine.cast_vote(submission, &actor).await })
            })
            .collect();
        let mut results = Vec::new();
        for cast in casts {
            results.push(cast.await.unwrap());
        }

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(Error::DuplicateVote(_) | Error::Conflict(_)))));

        let winner = winners[0];
        let live = count(&store, "cast_votes", doc! {"live": true}).await;
        assert_eq!(live, winner.selection_count() as u64);
        let mut tx = store.begin("read").await.unwrap();
        let delegate = tx
            .delegate_by_control_number(seeded.election.id, seeded.control_number(0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delegate.voted_at, Some(winner.cast_at));
        tx.commit().await.unwrap();
    }

    #[backend_test(mongo, started)]
    async fn casts_by_different_delegates_do_not_conflict(engine: Engine, seeded: Seeded) {
        let actor = Actor::example();
        let casts: Vec<_> = (0..seeded.delegates.len())
            .map(|delegate| {
                let engine = engine.clone();
                let submission = seeded.full_submission(delegate);
                let actor = actor.clone();
                tokio::spawn(async move { engine.cast_vote(submission, &actor).await })
            })
            .collect();
        let mut ballots = Vec::new();
        for cast in casts {
            ballots.push(cast.await.unwrap().unwrap().ballot_id);
        }
        ballots.sort_unstable();
        ballots.dedup();
        assert_eq!(ballots.len(), seeded.delegates.len());
    }

    #[backend_test(mongo, scheduled)]
    async fn setup_writes_conflict_with_a_concurrent_start(
        engine: Engine,
        store: MongoStore,
        seeded: Seeded,
    ) {
        let id = seeded.election.id;
        let mut tx = store.begin("edit").await.unwrap();
        let read = tx.election(id).await.unwrap().unwrap();
        assert_eq!(read.status, ElectionStatus::Scheduled);

        engine.start_election(id, &Actor::example()).await.unwrap();

        let result = tx.lock_election(id, ElectionStatus::Scheduled).await;
        assert!(matches!(result, Err(StoreError::Conflict(_)) | Ok(false)));
        tx.rollback().await.ok();
        assert_eq!(
            engine.election(id).await.unwrap().status,
            ElectionStatus::Started
        );
    }

    #[backend_test(mongo, started)]
    async fn closing_conflicts_with_a_cast_in_flight(
        engine: Engine,
        store: MongoStore,
        seeded: Seeded,
    ) {
        let id = seeded.election.id;
        let mut tx = store.begin("cast").await.unwrap();
        let delegate = tx
            .delegate_by_control_number(id, seeded.control_number(1))
            .await
            .unwrap()
            .unwrap();

        engine.close_election(id, &Actor::example()).await.unwrap();

        let result = tx.set_delegate_voted(delegate.id, Some(now())).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        tx.rollback().await.ok();
        assert_eq!(
            engine.election(id).await.unwrap().status,
            ElectionStatus::Closed
        );
    }
}
