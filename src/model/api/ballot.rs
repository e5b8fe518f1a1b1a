use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{
        ballot::{BallotId, BallotStatus},
        election::{CandidateId, DistrictId, ElectionId, PositionId},
    },
    db::{Ballot, Candidate, Position},
};

/// A candidate as shown on a ballot or receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotCandidate {
    pub id: CandidateId,
    pub name: String,
    pub district_id: Option<DistrictId>,
}

impl From<&Candidate> for BallotCandidate {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.name.clone(),
            district_id: candidate.district_id,
        }
    }
}

/// A position with everyone standing for it, for rendering a ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotPosition {
    pub id: PositionId,
    pub title: String,
    pub max_candidates: u32,
    pub term: Option<String>,
    pub candidates: Vec<BallotCandidate>,
}

impl BallotPosition {
    /// Group candidates under their positions, both in ID order.
    pub fn group(positions: &[Position], candidates: &[Candidate]) -> Vec<Self> {
        let mut by_position: BTreeMap<PositionId, Vec<BallotCandidate>> = BTreeMap::new();
        for candidate in candidates {
            by_position
                .entry(candidate.position_id)
                .or_default()
                .push(candidate.into());
        }
        let mut grouped: Vec<_> = positions
            .iter()
            .map(|position| {
                let mut candidates = by_position.remove(&position.id).unwrap_or_default();
                candidates.sort_by_key(|c| c.id);
                Self {
                    id: position.id,
                    title: position.title.clone(),
                    max_candidates: position.max_candidates,
                    term: position.term.clone(),
                    candidates,
                }
            })
            .collect();
        grouped.sort_by_key(|p| p.id);
        grouped
    }
}

/// A delegate's completed ballot.
///
/// Positions left out of `selections`, or mapped to an empty list, are abstentions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallotSubmission {
    pub control_number: String,
    pub selections: BTreeMap<PositionId, Vec<CandidateId>>,
}

/// Identifies a delegate's ballot by control number, e.g. to reprint or void it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallotLookup {
    pub control_number: String,
}

/// A ballot's state, without any selections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotDescription {
    pub id: BallotId,
    pub election_id: ElectionId,
    pub status: BallotStatus,
    pub issued_at: DateTime<Utc>,
    pub cast_at: Option<DateTime<Utc>>,
    pub voided_at: Option<DateTime<Utc>>,
}

impl From<Ballot> for BallotDescription {
    fn from(ballot: Ballot) -> Self {
        Self {
            id: ballot.id,
            election_id: ballot.ballot.election_id,
            status: ballot.ballot.status,
            issued_at: ballot.ballot.issued_at,
            cast_at: ballot.ballot.cast_at,
            voided_at: ballot.ballot.voided_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::db::{CandidateCore, PositionCore};

    fn position(id: PositionId) -> Position {
        Position {
            id,
            position: PositionCore {
                election_id: 1,
                title: format!("Position {id}"),
                max_candidates: 1,
                term: None,
            },
        }
    }

    fn candidate(id: CandidateId, position_id: PositionId) -> Candidate {
        Candidate {
            id,
            candidate: CandidateCore {
                election_id: 1,
                position_id,
                district_id: None,
                name: format!("Candidate {id}"),
            },
        }
    }

    #[test]
    fn candidates_are_grouped_under_positions() {
        let positions = [position(2), position(1)];
        let candidates = [candidate(5, 1), candidate(3, 2), candidate(4, 1)];
        let grouped = BallotPosition::group(&positions, &candidates);

        assert_eq!(grouped.iter().map(|p| p.id).collect::<Vec<_>>(), [1, 2]);
        let ids = |p: &BallotPosition| p.candidates.iter().map(|c| c.id).collect::<Vec<_>>();
        assert_eq!(ids(&grouped[0]), [4, 5]);
        assert_eq!(ids(&grouped[1]), [3]);
    }

    #[test]
    fn positions_without_candidates_are_kept() {
        let grouped = BallotPosition::group(&[position(1)], &[]);
        assert_eq!(grouped.len(), 1);
        assert!(grouped[0].candidates.is_empty());
    }

    #[test]
    fn selections_are_keyed_by_position() {
        let submission: BallotSubmission = rocket::serde::json::from_str(
            r#"{"control_number": "CN-000001", "selections": {"1": [4, 5], "2": []}}"#,
        )
        .unwrap();
        assert_eq!(submission.selections[&1], vec![4, 5]);
        assert!(submission.selections[&2].is_empty());
    }
}
