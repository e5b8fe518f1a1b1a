//! The vote-casting transaction.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::info;

use crate::error::{Error, Result};
use crate::model::{
    api::{
        ballot::BallotSubmission,
        receipt::{Receipt, ReceiptSource},
    },
    common::{
        actor::Actor,
        election::{CandidateId, ElectionStatus, PositionId},
        now,
    },
    db::{AuditAction, AuditEntry, Candidate, CastVote, Position},
};
use crate::store::UnitOfWork;

use super::{
    active::resolve,
    registry::{find_by_control_number, issue_or_resolve_ballot, mark_voted},
    Engine,
};

/// Check a delegate's selections against the election's positions and candidates.
///
/// Selecting fewer candidates than a position allows, including none, is an
/// abstention and is accepted.
pub fn validate_selections(
    positions: &[Position],
    candidates: &[Candidate],
    selections: &BTreeMap<PositionId, Vec<CandidateId>>,
) -> Result<()> {
    if selections.is_empty() {
        return Err(Error::InvalidArgument(
            "a ballot must include at least one position".to_string(),
        ));
    }
    let positions: HashMap<PositionId, &Position> =
        positions.iter().map(|p| (p.id, p)).collect();
    let candidates: HashMap<CandidateId, &Candidate> =
        candidates.iter().map(|c| (c.id, c)).collect();

    for (&position_id, chosen) in selections {
        let position = positions
            .get(&position_id)
            .ok_or(Error::InvalidPosition(position_id))?;

        let mut seen = HashSet::new();
        for &candidate_id in chosen {
            if !seen.insert(candidate_id) {
                return Err(Error::InvalidArgument(format!(
                    "candidate {candidate_id} selected twice for position {position_id}"
                )));
            }
            match candidates.get(&candidate_id) {
                Some(candidate) if candidate.position_id == position_id => {}
                _ => {
                    return Err(Error::InvalidCandidate {
                        position: position_id,
                        candidate: candidate_id,
                    })
                }
            }
        }

        if chosen.len() > position.max_candidates as usize {
            return Err(Error::TooManyCandidates {
                position: position_id,
                max: position.max_candidates,
                selected: chosen.len(),
            });
        }
    }
    Ok(())
}

/// Per-position selection counts, e.g. `"position 1: 1, position 2: 0"`.
fn selection_counts(selections: &BTreeMap<PositionId, Vec<CandidateId>>) -> String {
    selections
        .iter()
        .map(|(position_id, chosen)| format!("position {position_id}: {}", chosen.len()))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn cast(
    tx: &mut UnitOfWork,
    submission: &BallotSubmission,
    actor: &Actor,
) -> Result<Receipt> {
    let election = resolve(tx).await?;
    if election.status != ElectionStatus::Started {
        return Err(Error::ElectionNotStarted(election.id, election.status));
    }
    let delegate = find_by_control_number(tx, election.id, &submission.control_number).await?;
    let ballot = issue_or_resolve_ballot(tx, &delegate, election.id, actor).await?;
    if !ballot.status.is_castable() {
        return Err(Error::DuplicateVote(submission.control_number.clone()));
    }

    let positions = tx.positions(election.id).await?;
    let candidates = tx.candidates(election.id).await?;
    validate_selections(&positions, &candidates, &submission.selections)?;

    let at = now();
    let (ballot_id, election_id) = (ballot.id, election.id);
    let votes: Vec<CastVote> = submission
        .selections
        .iter()
        .flat_map(|(&position_id, chosen)| {
            chosen.iter().map(move |&candidate_id| CastVote {
                ballot_id,
                election_id,
                position_id,
                candidate_id,
                cast_at: at,
                deleted_at: None,
            })
        })
        .collect();
    tx.insert_cast_votes(&votes).await?;
    let ballot = mark_voted(tx, &ballot, &delegate, at).await?;

    tx.append(
        AuditEntry::new(
            AuditAction::VoteCast,
            "ballot",
            ballot.id,
            format!(
                "{} selections ({})",
                votes.len(),
                selection_counts(&submission.selections)
            ),
            actor,
        )
        .in_election(election.id),
    )
    .await?;

    Ok(Receipt::build(ReceiptSource {
        election: &election,
        delegate: &delegate,
        ballot: &ballot,
        cast_at: at,
        positions: &positions,
        candidates: &candidates,
        votes: &votes,
    }))
}

impl Engine {
    /// Record a delegate's ballot in the active election.
    ///
    /// All or nothing: on any failure no selection, ballot change or audit
    /// entry is left behind. A uniqueness violation raised by the store (a
    /// concurrent cast by the same delegate) is reported as
    /// [`Error::DuplicateVote`].
    pub async fn cast_vote(&self, submission: BallotSubmission, actor: &Actor) -> Result<Receipt> {
        let mut tx = self.begin("cast vote").await?;
        let result = cast(&mut tx, &submission, actor).await;
        let receipt = tx
            .complete(result)
            .await
            .map_err(|err| err.duplicate_as_vote(&submission.control_number))?;
        info!(
            "Ballot {} cast in election {} ({})",
            receipt.ballot_id,
            receipt.election.id,
            selection_counts(&submission.selections)
        );
        Ok(receipt)
    }
}
