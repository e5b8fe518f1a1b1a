use std::fmt::{Display, Formatter};

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the Election lifecycle.
///
/// ```text
/// SCHEDULED --> STARTED --> CLOSED
///     |
///     +-------> CANCELLED
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElectionStatus {
    /// Being set up. The only state in which positions, candidates and the
    /// delegate roster may be edited.
    Scheduled,
    /// Open for voting.
    Started,
    /// Voting has finished. Terminal.
    #[serde(alias = "ENDED")]
    Closed,
    /// Abandoned before it started. Terminal.
    Cancelled,
}

impl ElectionStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [ElectionStatus; 4] = [
        ElectionStatus::Scheduled,
        ElectionStatus::Started,
        ElectionStatus::Closed,
        ElectionStatus::Cancelled,
    ];

    /// The statuses this one may move to.
    pub const fn targets(self) -> &'static [ElectionStatus] {
        match self {
            ElectionStatus::Scheduled => &[ElectionStatus::Started, ElectionStatus::Cancelled],
            ElectionStatus::Started => &[ElectionStatus::Closed],
            ElectionStatus::Closed | ElectionStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: ElectionStatus) -> bool {
        self.targets().contains(&target)
    }

    /// Structural edits are only allowed before the election starts.
    pub fn is_editable(self) -> bool {
        self == ElectionStatus::Scheduled
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ElectionStatus::Scheduled => "SCHEDULED",
            ElectionStatus::Started => "STARTED",
            ElectionStatus::Closed => "CLOSED",
            ElectionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl Display for ElectionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
