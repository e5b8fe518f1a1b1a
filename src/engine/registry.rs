//! Delegates and their ballots.

use chrono::{DateTime, Utc};
use log::info;

use crate::error::{Error, Result};
use crate::model::{
    common::{actor::Actor, ballot::BallotStatus, election::ElectionId, election::ElectionStatus, now},
    db::{AuditAction, AuditEntry, Ballot, Delegate, NewBallot},
};
use crate::store::UnitOfWork;

use super::{active::resolve, Engine};

/// The delegate with `control_number` in the given election.
pub(super) async fn find_by_control_number(
    tx: &mut UnitOfWork,
    election_id: ElectionId,
    control_number: &str,
) -> Result<Delegate> {
    tx.delegate_by_control_number(election_id, control_number)
        .await?
        .ok_or_else(|| Error::DelegateNotFound(control_number.to_string()))
}

/// The delegate's live ballot for the election, issuing one if there is none.
///
/// A returned ballot may already be CAST; callers that intend to cast must
/// check [`BallotStatus::is_castable`].
pub(super) async fn issue_or_resolve_ballot(
    tx: &mut UnitOfWork,
    delegate: &Delegate,
    election_id: ElectionId,
    actor: &Actor,
) -> Result<Ballot> {
    if let Some(ballot) = tx.live_ballot(delegate.id, election_id).await? {
        return Ok(ballot);
    }
    let ballot = tx
        .insert_ballot(&NewBallot::issue(delegate.id, election_id, now()))
        .await?;
    tx.append(
        AuditEntry::new(
            AuditAction::BallotIssued,
            "ballot",
            ballot.id,
            format!("issued to delegate {}", delegate.id),
            actor,
        )
        .in_election(election_id),
    )
    .await?;
    Ok(ballot)
}

/// Move a ballot from ISSUED (or PENDING) to CAST and flag its delegate as voted.
///
/// Only the vote-casting transaction calls this, after the ballot's
/// selections have been written in the same transaction.
pub(super) async fn mark_voted(
    tx: &mut UnitOfWork,
    ballot: &Ballot,
    delegate: &Delegate,
    at: DateTime<Utc>,
) -> Result<Ballot> {
    if !ballot.status.is_castable() {
        return Err(Error::DuplicateVote(delegate.control_number.clone()));
    }
    let mut cast = ballot.clone();
    cast.status = BallotStatus::Cast;
    cast.cast_at = Some(at);
    if !tx.update_ballot(&cast, ballot.status).await? {
        // Someone else cast it first.
        return Err(Error::DuplicateVote(delegate.control_number.clone()));
    }
    tx.set_delegate_voted(delegate.id, Some(at)).await?;
    Ok(cast)
}

async fn void(tx: &mut UnitOfWork, control_number: &str, actor: &Actor) -> Result<Ballot> {
    let election = resolve(tx).await?;
    if election.status != ElectionStatus::Started {
        return Err(Error::ElectionNotStarted(election.id, election.status));
    }
    let delegate = find_by_control_number(tx, election.id, control_number).await?;
    let ballot = match tx.live_ballot(delegate.id, election.id).await? {
        Some(ballot) if ballot.status == BallotStatus::Cast => ballot,
        _ => return Err(Error::NotVoted(control_number.to_string())),
    };

    let at = now();
    let mut voided = ballot.clone();
    voided.status = BallotStatus::Void;
    voided.voided_at = Some(at);
    if !tx.update_ballot(&voided, BallotStatus::Cast).await? {
        return Err(Error::Conflict(format!("ballot {} changed while voiding", ballot.id)));
    }
    let deleted = tx.soft_delete_cast_votes(ballot.id, at).await?;
    tx.set_delegate_voted(delegate.id, None).await?;
    tx.append(
        AuditEntry::new(
            AuditAction::BallotVoided,
            "ballot",
            ballot.id,
            format!("voided, {deleted} selections withdrawn"),
            actor,
        )
        .in_election(election.id),
    )
    .await?;
    Ok(voided)
}

impl Engine {
    /// Invalidate a delegate's cast ballot while the election is running.
    ///
    /// The ballot's selections are soft-deleted and the delegate may vote again
    /// on a freshly issued ballot.
    pub async fn void_ballot(&self, control_number: &str, actor: &Actor) -> Result<Ballot> {
        let mut tx = self.begin("void ballot").await?;
        let result = void(&mut tx, control_number, actor).await;
        let ballot = tx.complete(result).await?;
        info!("Ballot {} voided ({actor})", ballot.id);
        Ok(ballot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::Seeded;
    use crate::store::MemoryStore;

    #[backend_test(started)]
    async fn ballots_are_issued_once_and_then_resolved(engine: Engine, seeded: Seeded) {
        let actor = Actor::example();
        let mut tx = engine.begin("test").await.unwrap();
        let delegate = find_by_control_number(&mut tx, seeded.election.id, seeded.control_number(0))
            .await
            .unwrap();

        let first = issue_or_resolve_ballot(&mut tx, &delegate, seeded.election.id, &actor)
            .await
            .unwrap();
        let second = issue_or_resolve_ballot(&mut tx, &delegate, seeded.election.id, &actor)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.status, BallotStatus::Issued);
        tx.complete(Ok(())).await.unwrap();
    }

    #[backend_test(started)]
    async fn control_numbers_are_scoped_to_the_election(engine: Engine, seeded: Seeded) {
        let mut tx = engine.begin("test").await.unwrap();
        let other_election = seeded.election.id + 1;
        let result = find_by_control_number(&mut tx, other_election, seeded.control_number(0)).await;
        assert!(matches!(result, Err(Error::DelegateNotFound(_))));
        tx.complete(Ok(())).await.unwrap();
    }

    #[backend_test(started)]
    async fn marking_voted_twice_is_a_duplicate(engine: Engine, seeded: Seeded) {
        let actor = Actor::example();
        let mut tx = engine.begin("test").await.unwrap();
        let delegate = find_by_control_number(&mut tx, seeded.election.id, seeded.control_number(1))
            .await
            .unwrap();
        let ballot = issue_or_resolve_ballot(&mut tx, &delegate, seeded.election.id, &actor)
            .await
            .unwrap();

        let cast = mark_voted(&mut tx, &ballot, &delegate, now()).await.unwrap();
        assert_eq!(cast.status, BallotStatus::Cast);
        assert!(cast.cast_at.is_some());

        // A stale copy of the issued ballot loses the compare-and-set.
        let again = mark_voted(&mut tx, &ballot, &delegate, now()).await;
        assert!(matches!(again, Err(Error::DuplicateVote(_))));
        // And the cast ballot itself is no longer castable.
        let again = mark_voted(&mut tx, &cast, &delegate, now()).await;
        assert!(matches!(again, Err(Error::DuplicateVote(_))));
        tx.complete(Ok(())).await.unwrap();
    }

    #[backend_test(started)]
    async fn voiding_releases_the_ballot(engine: Engine, store: MemoryStore, seeded: Seeded) {
        let actor = Actor::example();
        let control_number = seeded.control_number(0);
        let receipt = engine
            .cast_vote(seeded.full_submission(0), &actor)
            .await
            .unwrap();

        let voided = engine.void_ballot(control_number, &actor).await.unwrap();
        assert_eq!(voided.id, receipt.ballot_id);
        assert_eq!(voided.status, BallotStatus::Void);

        let tables = store.snapshot().await;
        assert!(tables.votes_on(voided.id).all(|vote| vote.is_deleted()));
        assert_eq!(tables.votes_on(voided.id).count(), receipt.selection_count());
        let delegate = tables
            .delegates
            .values()
            .find(|d| d.control_number == control_number)
            .unwrap();
        assert!(!delegate.has_voted());
        assert_eq!(tables.audit_log.last().unwrap().action, AuditAction::BallotVoided);

        // The voided ballot cannot be reprinted, but the delegate may vote again.
        assert!(matches!(
            engine.reprint_ballot(control_number).await,
            Err(Error::NotVoted(_))
        ));
        let second = engine
            .cast_vote(seeded.full_submission(0), &actor)
            .await
            .unwrap();
        assert_ne!(second.ballot_id, receipt.ballot_id);
    }

    #[backend_test(started)]
    async fn only_cast_ballots_can_be_voided(engine: Engine, seeded: Seeded) {
        let result = engine
            .void_ballot(seeded.control_number(2), &Actor::example())
            .await;
        assert!(matches!(result, Err(Error::NotVoted(_))));
    }

    #[backend_test(scheduled)]
    async fn voiding_needs_a_running_election(engine: Engine, seeded: Seeded) {
        let result = engine
            .void_ballot(seeded.control_number(0), &Actor::example())
            .await;
        assert!(matches!(
            result,
            Err(Error::ElectionNotStarted(_, ElectionStatus::Scheduled))
        ));
    }
}
