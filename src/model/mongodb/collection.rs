use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};

use crate::model::db::{
    ActiveElection, AuditEntry, Ballot, Candidate, CastVote, Delegate, Election, Position,
};

use super::counter::Counter;

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A ballot as stored, with a `live` flag so a partial unique index can
/// enforce at most one non-void ballot per delegate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBallot {
    #[serde(flatten)]
    pub ballot: Ballot,
    pub live: bool,
}

impl From<&Ballot> for StoredBallot {
    fn from(ballot: &Ballot) -> Self {
        Self {
            ballot: ballot.clone(),
            live: ballot.status.is_live(),
        }
    }
}

/// A selection as stored, with a `live` flag that is cleared on soft deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredVote {
    #[serde(flatten)]
    pub vote: CastVote,
    pub live: bool,
}

impl From<&CastVote> for StoredVote {
    fn from(vote: &CastVote) -> Self {
        Self {
            vote: vote.clone(),
            live: !vote.is_deleted(),
        }
    }
}

pub(super) const ELECTIONS: &str = "elections";
impl MongoCollection for Election {
    const NAME: &'static str = ELECTIONS;
}

// Singleton collection holding the active election pointer.
impl MongoCollection for ActiveElection {
    const NAME: &'static str = "active_election";
}

pub(super) const POSITIONS: &str = "positions";
impl MongoCollection for Position {
    const NAME: &'static str = POSITIONS;
}

pub(super) const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}

pub(super) const DELEGATES: &str = "delegates";
impl MongoCollection for Delegate {
    const NAME: &'static str = DELEGATES;
}

pub(super) const BALLOTS: &str = "ballots";
impl MongoCollection for StoredBallot {
    const NAME: &'static str = BALLOTS;
}

impl MongoCollection for StoredVote {
    const NAME: &'static str = "cast_votes";
}

impl MongoCollection for AuditEntry {
    const NAME: &'static str = "audit_log";
}

impl MongoCollection for Counter {
    const NAME: &'static str = "counters";
}

/// Collections whose IDs come from a [`Counter`].
pub(super) const COUNTED: [&str; 5] = [ELECTIONS, POSITIONS, CANDIDATES, DELEGATES, BALLOTS];

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();
    let unique_while_live = IndexOptions::builder()
        .unique(true)
        .partial_filter_expression(doc! {"live": true})
        .build();

    // Delegate collection.
    let delegate_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "control_number": 1})
        .options(unique.clone())
        .build();
    Coll::<Delegate>::from_db(db)
        .create_index(delegate_index, None)
        .await?;

    // Ballot collection.
    let ballot_index = IndexModel::builder()
        .keys(doc! {"delegate_id": 1, "election_id": 1})
        .options(unique_while_live.clone())
        .build();
    Coll::<StoredBallot>::from_db(db)
        .create_index(ballot_index, None)
        .await?;

    // Cast vote collection.
    let vote_index = IndexModel::builder()
        .keys(doc! {"ballot_id": 1, "position_id": 1, "candidate_id": 1})
        .options(unique_while_live)
        .build();
    Coll::<StoredVote>::from_db(db)
        .create_index(vote_index, None)
        .await?;

    // Lookups by election.
    for (collection, keys) in [
        (POSITIONS, doc! {"election_id": 1}),
        (CANDIDATES, doc! {"election_id": 1, "position_id": 1}),
    ] {
        let index = IndexModel::builder().keys(keys).build();
        db.collection::<mongodb::bson::Document>(collection)
            .create_index(index, None)
            .await?;
    }

    Ok(())
}
