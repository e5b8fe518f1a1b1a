use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::common::{actor::Actor, election::ElectionId, now};

/// What a mutating step did.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ElectionCreated,
    ElectionUpdated,
    ElectionStarted,
    ElectionClosed,
    ElectionCancelled,
    ActiveElectionSet,
    ActiveElectionReset,
    PositionAdded,
    CandidateAdded,
    DelegateEnrolled,
    BallotIssued,
    VoteCast,
    BallotVoided,
}

impl Display for AuditAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // The serde name is the canonical spelling.
        let name = mongodb::bson::to_bson(self).map_err(|_| std::fmt::Error)?;
        match name.as_str() {
            Some(name) => f.write_str(name),
            None => Err(std::fmt::Error),
        }
    }
}

/// One activity-log row. Written in the same transaction as the change it describes.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    /// Kind of record that changed, e.g. `"election"` or `"ballot"`.
    pub entity: String,
    pub entity_id: u32,
    pub election_id: Option<ElectionId>,
    /// Free-text summary. Never pairs candidate identities with a delegate.
    pub details: String,
    pub actor: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        entity: &str,
        entity_id: u32,
        details: impl Into<String>,
        actor: &Actor,
    ) -> Self {
        Self {
            action,
            entity: entity.to_string(),
            entity_id,
            election_id: None,
            details: details.into(),
            actor: actor.name().to_string(),
            at: now(),
        }
    }

    /// Tag the entry with the election it belongs to.
    pub fn in_election(mut self, election_id: ElectionId) -> Self {
        self.election_id = Some(election_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_display_matches_stored_name() {
        assert_eq!(AuditAction::VoteCast.to_string(), "VOTE_CAST");
        assert_eq!(AuditAction::ActiveElectionReset.to_string(), "ACTIVE_ELECTION_RESET");
    }

    #[test]
    fn entry_records_actor_and_election() {
        let entry = AuditEntry::new(
            AuditAction::ElectionStarted,
            "election",
            4,
            "SCHEDULED -> STARTED",
            &Actor::example(),
        )
        .in_election(4);
        assert_eq!(entry.actor, "coordinator");
        assert_eq!(entry.election_id, Some(4));
        assert_eq!(entry.entity, "election");
    }
}
