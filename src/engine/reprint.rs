//! Read-only paths: ballot reprints and ballot rendering.

use crate::error::{Error, Result};
use crate::model::{
    api::{
        ballot::BallotPosition,
        receipt::{Receipt, ReceiptSource},
    },
    common::ballot::BallotStatus,
};
use crate::store::UnitOfWork;

use super::{active::resolve, registry::find_by_control_number, Engine};

async fn reprint(tx: &mut UnitOfWork, control_number: &str) -> Result<Receipt> {
    let election = resolve(tx).await?;
    let delegate = find_by_control_number(tx, election.id, control_number).await?;
    let not_voted = || Error::NotVoted(control_number.to_string());
    let ballot = tx
        .live_ballot(delegate.id, election.id)
        .await?
        .filter(|ballot| ballot.status == BallotStatus::Cast)
        .ok_or_else(not_voted)?;
    let cast_at = ballot.cast_at.ok_or_else(not_voted)?;

    let votes = tx.cast_votes(ballot.id).await?;
    let positions = tx.positions(election.id).await?;
    let candidates = tx.candidates(election.id).await?;
    Ok(Receipt::build(ReceiptSource {
        election: &election,
        delegate: &delegate,
        ballot: &ballot,
        cast_at,
        positions: &positions,
        candidates: &candidates,
        votes: &votes,
    }))
}

async fn ballot_candidates(tx: &mut UnitOfWork) -> Result<Vec<BallotPosition>> {
    let election = resolve(tx).await?;
    let positions = tx.positions(election.id).await?;
    let candidates = tx.candidates(election.id).await?;
    Ok(BallotPosition::group(&positions, &candidates))
}

impl Engine {
    /// Rebuild the receipt of a delegate's cast ballot. Writes nothing.
    pub async fn reprint_ballot(&self, control_number: &str) -> Result<Receipt> {
        let mut tx = self.begin("reprint ballot").await?;
        let result = reprint(&mut tx, control_number).await;
        tx.complete(result).await
    }

    /// The active election's positions with their candidates, for rendering a ballot.
    pub async fn ballot_candidates(&self) -> Result<Vec<BallotPosition>> {
        let mut tx = self.begin("ballot candidates").await?;
        let result = ballot_candidates(&mut tx).await;
        tx.complete(result).await
    }
}

#[cfg(test)]
mod tests {
    use rocket::serde::json;

    use super::*;
    use crate::engine::{fixtures::Seeded, registry::issue_or_resolve_ballot};
    use crate::model::common::actor::Actor;
    use crate::store::MemoryStore;

    #[backend_test(started)]
    async fn reprints_are_identical_and_write_nothing(
        engine: Engine,
        store: MemoryStore,
        seeded: Seeded,
    ) {
        let receipt = engine
            .cast_vote(seeded.full_submission(0), &Actor::example())
            .await
            .unwrap();
        let before = store.snapshot().await;

        let original = json::to_string(&receipt).unwrap();
        for _ in 0..3 {
            let reprint = engine.reprint_ballot(seeded.control_number(0)).await.unwrap();
            assert_eq!(json::to_string(&reprint).unwrap(), original);
        }

        let after = store.snapshot().await;
        assert_eq!(after.ballots, before.ballots);
        assert_eq!(after.cast_votes, before.cast_votes);
        assert_eq!(after.audit_log, before.audit_log);
    }

    #[backend_test(started)]
    async fn reprint_before_voting_is_not_voted(engine: Engine, store: MemoryStore, seeded: Seeded) {
        let result = engine.reprint_ballot(seeded.control_number(1)).await;
        assert!(matches!(result, Err(Error::NotVoted(cn)) if cn == seeded.control_number(1)));
        assert!(store.snapshot().await.ballots.is_empty());
    }

    #[backend_test(started)]
    async fn reprint_of_an_issued_ballot_is_not_voted(engine: Engine, seeded: Seeded) {
        // A failed cast rolls back, so issue a ballot through a committed transaction.
        let mut tx = engine.begin("issue").await.unwrap();
        let delegate = find_by_control_number(&mut tx, seeded.election.id, seeded.control_number(1))
            .await
            .unwrap();
        issue_or_resolve_ballot(&mut tx, &delegate, seeded.election.id, &Actor::example())
            .await
            .unwrap();
        tx.complete(Ok(())).await.unwrap();

        let result = engine.reprint_ballot(seeded.control_number(1)).await;
        assert!(matches!(result, Err(Error::NotVoted(_))));
    }

    #[backend_test(started)]
    async fn reprint_survives_closing(engine: Engine, seeded: Seeded) {
        let actor = Actor::example();
        let receipt = engine
            .cast_vote(seeded.full_submission(2), &actor)
            .await
            .unwrap();
        engine.close_election(seeded.election.id, &actor).await.unwrap();
        let reprint = engine.reprint_ballot(seeded.control_number(2)).await.unwrap();
        assert_eq!(reprint, receipt);
    }

    #[backend_test]
    async fn candidates_need_an_active_election(engine: Engine) {
        assert!(matches!(
            engine.ballot_candidates().await,
            Err(Error::NoActiveElection)
        ));
    }

    #[backend_test(scheduled)]
    async fn candidates_are_grouped_by_position(engine: Engine, seeded: Seeded) {
        let ballot = engine.ballot_candidates().await.unwrap();
        assert_eq!(ballot.len(), 2);
        assert_eq!(ballot[0].id, seeded.chair().id);
        assert_eq!(ballot[0].max_candidates, 1);
        assert_eq!(
            ballot[1].candidates.iter().map(|c| c.id).collect::<Vec<_>>(),
            seeded.candidates_for(seeded.board().id)
        );
    }
}
