use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{CandidateId, DelegateId, DistrictId, ElectionId, PositionId},
    db::{Candidate, Delegate, Position},
};

/// An API-friendly position description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDescription {
    pub id: PositionId,
    pub election_id: ElectionId,
    pub title: String,
    pub max_candidates: u32,
    pub term: Option<String>,
}

impl From<Position> for PositionDescription {
    fn from(position: Position) -> Self {
        Self {
            id: position.id,
            election_id: position.position.election_id,
            title: position.position.title,
            max_candidates: position.position.max_candidates,
            term: position.position.term,
        }
    }
}

/// An API-friendly candidate description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub id: CandidateId,
    pub election_id: ElectionId,
    pub position_id: PositionId,
    pub district_id: Option<DistrictId>,
    pub name: String,
}

impl From<Candidate> for CandidateDescription {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id,
            election_id: candidate.candidate.election_id,
            position_id: candidate.candidate.position_id,
            district_id: candidate.candidate.district_id,
            name: candidate.candidate.name,
        }
    }
}

/// An enrolled delegate, as shown to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateDescription {
    pub id: DelegateId,
    pub election_id: ElectionId,
    pub control_number: String,
    pub name: String,
    pub voted_at: Option<DateTime<Utc>>,
}

impl From<Delegate> for DelegateDescription {
    fn from(delegate: Delegate) -> Self {
        Self {
            id: delegate.id,
            election_id: delegate.delegate.election_id,
            control_number: delegate.delegate.control_number,
            name: delegate.delegate.name,
            voted_at: delegate.delegate.voted_at,
        }
    }
}
