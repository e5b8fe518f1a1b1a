//! The election state machine.
//!
//! The `check_*` functions are pure guards over an election value. They are
//! evaluated before anything is written; [`transitioned`] then produces the
//! new election value, and the engine persists it with a compare-and-set on
//! the old status together with one audit entry.

use chrono::{DateTime, Utc};
use log::info;

use crate::error::{Error, Result};
use crate::model::{
    common::{actor::Actor, election::ElectionId, election::ElectionStatus, now},
    db::{AuditAction, AuditEntry, Election},
};
use crate::store::UnitOfWork;

use super::Engine;

fn require_transition(election: &Election, to: ElectionStatus) -> Result<()> {
    if election.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            election: election.id,
            from: election.status,
            to,
        })
    }
}

/// An election may start from SCHEDULED once at least one delegate is enrolled.
pub fn check_start(election: &Election, enrolled_delegates: u64) -> Result<()> {
    require_transition(election, ElectionStatus::Started)?;
    if enrolled_delegates == 0 {
        return Err(Error::NoDelegates(election.id));
    }
    Ok(())
}

/// An election may close from STARTED, but never before its recorded start.
pub fn check_close(election: &Election, at: DateTime<Utc>) -> Result<()> {
    require_transition(election, ElectionStatus::Closed)?;
    match election.start_time {
        Some(start) if at < start => Err(Error::InvalidTransition {
            election: election.id,
            from: election.status,
            to: ElectionStatus::Closed,
        }),
        _ => Ok(()),
    }
}

/// Only an election that has not started can be cancelled.
pub fn check_cancel(election: &Election) -> Result<()> {
    require_transition(election, ElectionStatus::Cancelled)
}

/// Positions, candidates, the roster and the election's own details are
/// frozen once it leaves SCHEDULED.
pub fn assert_mutable(election: &Election) -> Result<()> {
    if election.status.is_editable() {
        Ok(())
    } else {
        Err(Error::ElectionLocked(election.id, election.status))
    }
}

/// The election after moving to `to` at time `at`.
///
/// Starting records the actual start time and closing the actual end time.
pub fn transitioned(election: &Election, to: ElectionStatus, at: DateTime<Utc>) -> Election {
    let mut next = election.clone();
    next.status = to;
    match to {
        ElectionStatus::Started => next.start_time = Some(at),
        ElectionStatus::Closed => next.end_time = Some(at),
        ElectionStatus::Scheduled | ElectionStatus::Cancelled => {}
    }
    next
}

fn audit_action(to: ElectionStatus) -> AuditAction {
    match to {
        ElectionStatus::Started => AuditAction::ElectionStarted,
        ElectionStatus::Closed => AuditAction::ElectionClosed,
        ElectionStatus::Cancelled => AuditAction::ElectionCancelled,
        ElectionStatus::Scheduled => AuditAction::ElectionUpdated,
    }
}

/// Load an election, or fail with [`Error::NotFound`].
pub(super) async fn load_election(tx: &mut UnitOfWork, id: ElectionId) -> Result<Election> {
    tx.election(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("election {id}")))
}

/// Keep the election in `status` until `tx` commits.
///
/// Operations that check the status and then write other rows call this, so
/// a transition committed in between makes them conflict instead of writing
/// into an election that has moved on.
pub(super) async fn hold_status(
    tx: &mut UnitOfWork,
    election: &Election,
    status: ElectionStatus,
) -> Result<()> {
    if tx.lock_election(election.id, status).await? {
        Ok(())
    } else {
        Err(Error::Conflict(format!(
            "election {} is no longer {status}",
            election.id
        )))
    }
}

/// Guard, apply and audit one transition inside `tx`.
async fn transition(
    tx: &mut UnitOfWork,
    id: ElectionId,
    to: ElectionStatus,
    actor: &Actor,
) -> Result<Election> {
    let election = load_election(tx, id).await?;
    let at = now();
    match to {
        ElectionStatus::Started => {
            let delegates = tx.count_delegates(id).await?;
            check_start(&election, delegates)?;
        }
        ElectionStatus::Closed => check_close(&election, at)?,
        ElectionStatus::Cancelled => check_cancel(&election)?,
        ElectionStatus::Scheduled => require_transition(&election, to)?,
    }

    let next = transitioned(&election, to, at);
    if !tx.replace_election(&next, election.status).await? {
        return Err(Error::Conflict(format!(
            "election {id} changed while moving to {to}"
        )));
    }
    if to == ElectionStatus::Closed {
        // Casts and voids still in flight conflict with the close.
        tx.lock_delegates(id).await?;
    }
    let entry = AuditEntry::new(
        audit_action(to),
        "election",
        id,
        format!("{} -> {to}", election.status),
        actor,
    )
    .in_election(id);
    tx.append(entry).await?;
    Ok(next)
}

impl Engine {
    async fn apply_transition(
        &self,
        label: &'static str,
        id: ElectionId,
        to: ElectionStatus,
        actor: &Actor,
    ) -> Result<Election> {
        let mut tx = self.begin(label).await?;
        let result = transition(&mut tx, id, to, actor).await;
        let election = tx.complete(result).await?;
        info!("Election {id} is now {to} ({actor})");
        Ok(election)
    }

    /// SCHEDULED -> STARTED. Requires at least one enrolled delegate.
    pub async fn start_election(&self, id: ElectionId, actor: &Actor) -> Result<Election> {
        self.apply_transition("start election", id, ElectionStatus::Started, actor)
            .await
    }

    /// STARTED -> CLOSED.
    pub async fn close_election(&self, id: ElectionId, actor: &Actor) -> Result<Election> {
        self.apply_transition("close election", id, ElectionStatus::Closed, actor)
            .await
    }

    /// SCHEDULED -> CANCELLED.
    pub async fn cancel_election(&self, id: ElectionId, actor: &Actor) -> Result<Election> {
        self.apply_transition("cancel election", id, ElectionStatus::Cancelled, actor)
            .await
    }
}
