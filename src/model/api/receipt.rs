use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::{ballot::BallotCandidate, election::ElectionHeader},
    common::{
        ballot::BallotId,
        election::{CandidateId, PositionId},
    },
    db::{Ballot, Candidate, CastVote, Delegate, Election, Position},
};

/// Proof of a cast ballot, handed to the delegate when voting and on every reprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub ballot_id: BallotId,
    pub election: ElectionHeader,
    pub control_number: String,
    pub cast_at: DateTime<Utc>,
    /// Every position of the election, in ID order. Abstentions have no selections.
    pub positions: Vec<ReceiptPosition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptPosition {
    pub position_id: PositionId,
    pub title: String,
    pub selected: Vec<BallotCandidate>,
}

/// Everything a receipt is built from.
pub struct ReceiptSource<'a> {
    pub election: &'a Election,
    pub delegate: &'a Delegate,
    pub ballot: &'a Ballot,
    pub cast_at: DateTime<Utc>,
    pub positions: &'a [Position],
    pub candidates: &'a [Candidate],
    pub votes: &'a [CastVote],
}

impl Receipt {
    /// Build a receipt from recorded selections.
    ///
    /// The output only depends on the stored rows, never on the order they
    /// were read or written in, so a receipt rebuilt later is identical.
    pub fn build(source: ReceiptSource<'_>) -> Self {
        let candidates: HashMap<CandidateId, &Candidate> =
            source.candidates.iter().map(|c| (c.id, c)).collect();
        let mut selected: BTreeMap<PositionId, Vec<BallotCandidate>> = BTreeMap::new();
        for vote in source.votes {
            if let Some(candidate) = candidates.get(&vote.candidate_id) {
                selected
                    .entry(vote.position_id)
                    .or_default()
                    .push(BallotCandidate::from(*candidate));
            }
        }

        let mut positions: Vec<_> = source
            .positions
            .iter()
            .map(|position| {
                let mut selected = selected.remove(&position.id).unwrap_or_default();
                selected.sort_by_key(|c| c.id);
                ReceiptPosition {
                    position_id: position.id,
                    title: position.title.clone(),
                    selected,
                }
            })
            .collect();
        positions.sort_by_key(|p| p.position_id);

        Self {
            ballot_id: source.ballot.id,
            election: ElectionHeader::from(source.election),
            control_number: source.delegate.control_number.clone(),
            cast_at: source.cast_at,
            positions,
        }
    }

    /// Number of candidates selected across all positions.
    pub fn selection_count(&self) -> usize {
        self.positions.iter().map(|p| p.selected.len()).sum()
    }
}
