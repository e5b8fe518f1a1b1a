use log::info;

use crate::error::{Error, Result};
use crate::model::{
    common::{actor::Actor, election::ElectionId, now},
    db::{ActiveElection, AuditAction, AuditEntry, Election, ACTIVE_ELECTION_ID},
};
use crate::store::UnitOfWork;

use super::{lifecycle::load_election, Engine};

/// The election the pointer refers to.
///
/// Fails with [`Error::NoActiveElection`] if the pointer is unset or refers
/// to an election that no longer exists. Voting operations call this before
/// anything else.
pub(super) async fn resolve(tx: &mut UnitOfWork) -> Result<Election> {
    let pointer = tx.active_election().await?;
    let id = pointer.election_id.ok_or(Error::NoActiveElection)?;
    tx.election(id).await?.ok_or(Error::NoActiveElection)
}

impl Engine {
    /// Point the system at `election_id`.
    pub async fn set_active_election(
        &self,
        election_id: ElectionId,
        actor: &Actor,
    ) -> Result<Election> {
        if election_id == 0 {
            return Err(Error::InvalidArgument(
                "election id must be positive".to_string(),
            ));
        }
        let mut tx = self.begin("set active election").await?;
        let result = async {
            let election = load_election(&mut tx, election_id).await?;
            let previous = tx.active_election().await?.election_id;
            tx.save_active_election(&ActiveElection::pointing_at(
                Some(election_id),
                actor,
                now(),
            ))
            .await?;
            let details = match previous {
                Some(previous) => format!("election {previous} -> election {election_id}"),
                None => format!("unset -> election {election_id}"),
            };
            tx.append(
                AuditEntry::new(
                    AuditAction::ActiveElectionSet,
                    "active_election",
                    ACTIVE_ELECTION_ID,
                    details,
                    actor,
                )
                .in_election(election_id),
            )
            .await?;
            Ok::<_, Error>(election)
        }
        .await;
        let election = tx.complete(result).await?;
        info!("Active election set to {election_id} ({actor})");
        Ok(election)
    }

    /// Clear the pointer, leaving no election active.
    pub async fn reset_active_election(&self, actor: &Actor) -> Result<()> {
        let mut tx = self.begin("reset active election").await?;
        let result = async {
            let previous = tx.active_election().await?.election_id;
            tx.save_active_election(&ActiveElection::pointing_at(None, actor, now()))
                .await?;
            let details = match previous {
                Some(previous) => format!("election {previous} -> unset"),
                None => "unset -> unset".to_string(),
            };
            tx.append(AuditEntry::new(
                AuditAction::ActiveElectionReset,
                "active_election",
                ACTIVE_ELECTION_ID,
                details,
                actor,
            ))
            .await?;
            Ok::<_, Error>(())
        }
        .await;
        tx.complete(result).await?;
        info!("Active election reset ({actor})");
        Ok(())
    }

    /// The currently active election.
    pub async fn active_election(&self) -> Result<Election> {
        let mut tx = self.begin("resolve active election").await?;
        let result = resolve(&mut tx).await;
        tx.complete(result).await
    }
}
