//! A seeded example election for tests.

use crate::model::{
    api::{
        ballot::BallotSubmission,
        election::{CandidateSpec, DelegateSpec, ElectionSpec, PositionSpec},
    },
    common::{
        actor::Actor,
        election::{CandidateId, PositionId},
    },
    db::{Candidate, Delegate, Election, Position},
};

use super::Engine;

/// An active election with two positions, five candidates and three delegates.
///
/// - "Chair" allows one selection from two candidates.
/// - "Board of Directors" allows two selections from three candidates.
#[derive(Debug, Clone)]
pub struct Seeded {
    pub election: Election,
    pub positions: Vec<Position>,
    pub candidates: Vec<Candidate>,
    pub delegates: Vec<Delegate>,
}

impl Seeded {
    pub fn chair(&self) -> &Position {
        &self.positions[0]
    }

    pub fn board(&self) -> &Position {
        &self.positions[1]
    }

    /// IDs of the candidates standing for a position, in ID order.
    pub fn candidates_for(&self, position_id: PositionId) -> Vec<CandidateId> {
        let mut ids: Vec<_> = self
            .candidates
            .iter()
            .filter(|c| c.position_id == position_id)
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn control_number(&self, delegate: usize) -> &str {
        &self.delegates[delegate].control_number
    }

    /// A ballot that fills every seat: one chair, two board members.
    pub fn full_submission(&self, delegate: usize) -> BallotSubmission {
        let chair = self.chair().id;
        let board = self.board().id;
        BallotSubmission {
            control_number: self.control_number(delegate).to_string(),
            selections: [
                (chair, self.candidates_for(chair)[..1].to_vec()),
                (board, self.candidates_for(board)[..2].to_vec()),
            ]
            .into_iter()
            .collect(),
        }
    }
}

/// Create the example election, make it active and optionally start it.
pub async fn seed(engine: &Engine, started: bool) -> Seeded {
    let actor = Actor::example();
    let mut election = engine
        .create_election(ElectionSpec::example(), &actor)
        .await
        .unwrap();

    let mut positions = Vec::new();
    let mut candidates = Vec::new();
    let slate = [
        (PositionSpec::example("Chair", 1), &["Maria Santos", "Jose Reyes"][..]),
        (
            PositionSpec::example("Board of Directors", 2),
            &["Liza Tan", "Ramon Cruz", "Nora Lim"][..],
        ),
    ];
    for (spec, names) in slate {
        let position = engine
            .add_position(election.id, spec, &actor)
            .await
            .unwrap();
        for name in names {
            let candidate = engine
                .add_candidate(election.id, CandidateSpec::example(position.id, name), &actor)
                .await
                .unwrap();
            candidates.push(candidate);
        }
        positions.push(position);
    }

    let mut delegates = Vec::new();
    for (i, name) in ["Ana Cruz", "Ben Dela Paz", "Carla Uy"].into_iter().enumerate() {
        let spec = DelegateSpec::example(name, &format!("CN-{:06}", i + 1));
        delegates.push(
            engine
                .enroll_delegate(election.id, spec, &actor)
                .await
                .unwrap(),
        );
    }

    engine
        .set_active_election(election.id, &actor)
        .await
        .unwrap();
    if started {
        election = engine.start_election(election.id, &actor).await.unwrap();
    }

    Seeded {
        election,
        positions,
        candidates,
        delegates,
    }
}
