use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{
        ballot::{BallotId, BallotStatus},
        election::{CandidateId, DelegateId, ElectionId, PositionId},
    },
    mongodb::optional_datetime,
};

/// Core ballot data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct BallotCore {
    pub delegate_id: DelegateId,
    pub election_id: ElectionId,
    pub status: BallotStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub issued_at: DateTime<Utc>,
    #[serde(default, with = "optional_datetime")]
    pub cast_at: Option<DateTime<Utc>>,
    #[serde(default, with = "optional_datetime")]
    pub voided_at: Option<DateTime<Utc>>,
}

impl BallotCore {
    /// A freshly issued ballot for the given delegate.
    pub fn issue(delegate_id: DelegateId, election_id: ElectionId, at: DateTime<Utc>) -> Self {
        Self {
            delegate_id,
            election_id,
            status: BallotStatus::Issued,
            issued_at: at,
            cast_at: None,
            voided_at: None,
        }
    }
}

/// A ballot without an ID.
pub type NewBallot = BallotCore;

/// A ballot from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(rename = "_id")]
    pub id: BallotId,
    #[serde(flatten)]
    pub ballot: BallotCore,
}

impl Deref for Ballot {
    type Target = BallotCore;

    fn deref(&self) -> &Self::Target {
        &self.ballot
    }
}

impl DerefMut for Ballot {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ballot
    }
}

/// One recorded selection: a candidate chosen for a position on a ballot.
///
/// Rows are never updated once written, except for `deleted_at`, which marks
/// the selections of a voided ballot.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct CastVote {
    pub ballot_id: BallotId,
    pub election_id: ElectionId,
    pub position_id: PositionId,
    pub candidate_id: CandidateId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
    #[serde(default, with = "optional_datetime")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl CastVote {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
