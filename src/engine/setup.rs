//! Election setup: everything an administrator does before an election starts.

use log::{debug, info};
use rand::thread_rng;

use crate::error::{Error, Result};
use crate::model::{
    api::election::{CandidateSpec, DelegateSpec, ElectionSpec, PositionSpec},
    common::{actor::Actor, election::ElectionId, election::ElectionStatus},
    db::{
        generate_control_number, AuditAction, AuditEntry, Candidate, Delegate, Election,
        NewElection, Position,
    },
};
use crate::store::{StoreError, UnitOfWork};

use super::{
    assert_mutable,
    lifecycle::{hold_status, load_election},
    Engine,
};

/// Attempts at drawing an unused control number before giving up.
const CONTROL_NUMBER_ATTEMPTS: usize = 10;

async fn create(tx: &mut UnitOfWork, spec: ElectionSpec, actor: &Actor) -> Result<Election> {
    let election = tx.insert_election(&NewElection::from(spec)).await?;
    tx.append(
        AuditEntry::new(
            AuditAction::ElectionCreated,
            "election",
            election.id,
            format!("created '{}'", election.name),
            actor,
        )
        .in_election(election.id),
    )
    .await?;
    Ok(election)
}

async fn update(
    tx: &mut UnitOfWork,
    id: ElectionId,
    spec: ElectionSpec,
    actor: &Actor,
) -> Result<Election> {
    let mut election = load_election(tx, id).await?;
    assert_mutable(&election)?;
    spec.apply_to(&mut election);
    if let Some(max) = election.max_attendees {
        let enrolled = tx.count_delegates(id).await?;
        if enrolled > u64::from(max) {
            return Err(Error::InvalidArgument(format!(
                "election {id} already has {enrolled} delegates, more than {max}"
            )));
        }
    }
    if !tx
        .replace_election(&election, ElectionStatus::Scheduled)
        .await?
    {
        return Err(Error::Conflict(format!("election {id} changed while editing")));
    }
    tx.append(
        AuditEntry::new(
            AuditAction::ElectionUpdated,
            "election",
            id,
            format!("details of '{}' updated", election.name),
            actor,
        )
        .in_election(id),
    )
    .await?;
    Ok(election)
}

async fn add_position(
    tx: &mut UnitOfWork,
    election_id: ElectionId,
    spec: PositionSpec,
    actor: &Actor,
) -> Result<Position> {
    let election = load_election(tx, election_id).await?;
    assert_mutable(&election)?;
    hold_status(tx, &election, ElectionStatus::Scheduled).await?;
    let position = tx.insert_position(&spec.into_position(election_id)).await?;
    tx.append(
        AuditEntry::new(
            AuditAction::PositionAdded,
            "position",
            position.id,
            format!(
                "'{}', up to {} selections",
                position.title, position.max_candidates
            ),
            actor,
        )
        .in_election(election_id),
    )
    .await?;
    Ok(position)
}

async fn add_candidate(
    tx: &mut UnitOfWork,
    election_id: ElectionId,
    spec: CandidateSpec,
    actor: &Actor,
) -> Result<Candidate> {
    let election = load_election(tx, election_id).await?;
    assert_mutable(&election)?;
    hold_status(tx, &election, ElectionStatus::Scheduled).await?;
    let positions = tx.positions(election_id).await?;
    if !positions.iter().any(|p| p.id == spec.position_id) {
        return Err(Error::InvalidPosition(spec.position_id));
    }
    let candidate = tx
        .insert_candidate(&spec.into_candidate(election_id))
        .await?;
    tx.append(
        AuditEntry::new(
            AuditAction::CandidateAdded,
            "candidate",
            candidate.id,
            format!("'{}' for position {}", candidate.name, candidate.position_id),
            actor,
        )
        .in_election(election_id),
    )
    .await?;
    Ok(candidate)
}

/// A control number not yet used in the election.
async fn fresh_control_number(tx: &mut UnitOfWork, election_id: ElectionId) -> Result<String> {
    for _ in 0..CONTROL_NUMBER_ATTEMPTS {
        let candidate = generate_control_number(&mut thread_rng());
        if tx
            .delegate_by_control_number(election_id, &candidate)
            .await?
            .is_none()
        {
            return Ok(candidate);
        }
        debug!("Control number {candidate} already taken in election {election_id}");
    }
    Err(Error::Conflict(format!(
        "no free control number in election {election_id} after {CONTROL_NUMBER_ATTEMPTS} attempts"
    )))
}

async fn enroll(
    tx: &mut UnitOfWork,
    election_id: ElectionId,
    spec: DelegateSpec,
    actor: &Actor,
) -> Result<Delegate> {
    let election = load_election(tx, election_id).await?;
    assert_mutable(&election)?;
    hold_status(tx, &election, ElectionStatus::Scheduled).await?;
    if let Some(max) = election.max_attendees {
        if tx.count_delegates(election_id).await? >= u64::from(max) {
            return Err(Error::InvalidArgument(format!(
                "election {election_id} is limited to {max} attendees"
            )));
        }
    }

    let control_number = match spec.control_number.clone() {
        Some(control_number) => control_number,
        None => fresh_control_number(tx, election_id).await?,
    };
    let delegate = tx
        .insert_delegate(&spec.into_delegate(election_id, control_number))
        .await
        .map_err(|err| match err {
            StoreError::Duplicate(_) => {
                Error::InvalidArgument("control number already in use".to_string())
            }
            other => other.into(),
        })?;
    tx.append(
        AuditEntry::new(
            AuditAction::DelegateEnrolled,
            "delegate",
            delegate.id,
            format!("'{}' enrolled", delegate.name),
            actor,
        )
        .in_election(election_id),
    )
    .await?;
    Ok(delegate)
}

impl Engine {
    /// Create a new SCHEDULED election.
    pub async fn create_election(&self, spec: ElectionSpec, actor: &Actor) -> Result<Election> {
        spec.validate()?;
        let mut tx = self.begin("create election").await?;
        let result = create(&mut tx, spec, actor).await;
        let election = tx.complete(result).await?;
        info!("Election {} created ({actor})", election.id);
        Ok(election)
    }

    /// Replace the details of a SCHEDULED election.
    pub async fn update_election(
        &self,
        id: ElectionId,
        spec: ElectionSpec,
        actor: &Actor,
    ) -> Result<Election> {
        spec.validate()?;
        let mut tx = self.begin("update election").await?;
        let result = update(&mut tx, id, spec, actor).await;
        let election = tx.complete(result).await?;
        info!("Election {id} updated ({actor})");
        Ok(election)
    }

    pub async fn add_position(
        &self,
        election_id: ElectionId,
        spec: PositionSpec,
        actor: &Actor,
    ) -> Result<Position> {
        spec.validate()?;
        let mut tx = self.begin("add position").await?;
        let result = add_position(&mut tx, election_id, spec, actor).await;
        tx.complete(result).await
    }

    /// Add a candidate. The candidate's position must belong to the same election.
    pub async fn add_candidate(
        &self,
        election_id: ElectionId,
        spec: CandidateSpec,
        actor: &Actor,
    ) -> Result<Candidate> {
        spec.validate()?;
        let mut tx = self.begin("add candidate").await?;
        let result = add_candidate(&mut tx, election_id, spec, actor).await;
        tx.complete(result).await
    }

    /// Enroll a delegate, generating a control number unless one is supplied.
    pub async fn enroll_delegate(
        &self,
        election_id: ElectionId,
        spec: DelegateSpec,
        actor: &Actor,
    ) -> Result<Delegate> {
        spec.validate()?;
        let mut tx = self.begin("enroll delegate").await?;
        let result = enroll(&mut tx, election_id, spec, actor).await;
        tx.complete(result).await
    }

    pub async fn elections(&self) -> Result<Vec<Election>> {
        let mut tx = self.begin("list elections").await?;
        let result = tx.elections().await.map_err(Error::from);
        tx.complete(result).await
    }

    pub async fn election(&self, id: ElectionId) -> Result<Election> {
        let mut tx = self.begin("get election").await?;
        let result = load_election(&mut tx, id).await;
        tx.complete(result).await
    }

    /// An election's positions, in ID order.
    pub async fn positions(&self, election_id: ElectionId) -> Result<Vec<Position>> {
        let mut tx = self.begin("list positions").await?;
        let result = async {
            load_election(&mut tx, election_id).await?;
            Ok::<_, Error>(tx.positions(election_id).await?)
        }
        .await;
        tx.complete(result).await
    }

    /// An election's candidates, in ID order.
    pub async fn candidates(&self, election_id: ElectionId) -> Result<Vec<Candidate>> {
        let mut tx = self.begin("list candidates").await?;
        let result = async {
            load_election(&mut tx, election_id).await?;
            Ok::<_, Error>(tx.candidates(election_id).await?)
        }
        .await;
        tx.complete(result).await
    }
}
