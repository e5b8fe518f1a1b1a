use std::fmt::{Display, Formatter};

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// Ballot IDs are unique across all elections.
pub type BallotId = u32;

/// States of a delegate's ballot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BallotStatus {
    /// Reserved for a delegate but not yet handed out.
    Pending,
    /// Handed out; may be cast.
    Issued,
    /// Votes recorded. A cast ballot is never cast again.
    Cast,
    /// Administratively invalidated. Does not count towards the
    /// one-ballot-per-delegate rule.
    Void,
}

impl BallotStatus {
    /// Can votes still be recorded against a ballot in this state?
    pub fn is_castable(self) -> bool {
        matches!(self, BallotStatus::Pending | BallotStatus::Issued)
    }

    /// Does this ballot occupy the delegate's single ballot slot?
    pub fn is_live(self) -> bool {
        self != BallotStatus::Void
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BallotStatus::Pending => "PENDING",
            BallotStatus::Issued => "ISSUED",
            BallotStatus::Cast => "CAST",
            BallotStatus::Void => "VOID",
        }
    }
}

impl Display for BallotStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<BallotStatus> for Bson {
    fn from(status: BallotStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
