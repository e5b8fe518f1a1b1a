use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{actor::Actor, election::ElectionId},
    mongodb::optional_datetime,
};

/// Fixed `_id` of the singleton pointer row.
pub const ACTIVE_ELECTION_ID: u32 = 1;

/// The singleton row naming the election that is currently live.
///
/// There is only ever one of these; `election_id` being `None` means no
/// election is active and every voting operation must refuse to run.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ActiveElection {
    #[serde(rename = "_id")]
    pub id: u32,
    pub election_id: Option<ElectionId>,
    pub updated_by: Option<String>,
    #[serde(default, with = "optional_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ActiveElection {
    /// The pointer as it is before anyone configures it.
    pub fn unset() -> Self {
        Self {
            id: ACTIVE_ELECTION_ID,
            election_id: None,
            updated_by: None,
            updated_at: None,
        }
    }

    /// A pointer at `election_id`, stamped with who changed it and when.
    pub fn pointing_at(election_id: Option<ElectionId>, actor: &Actor, at: DateTime<Utc>) -> Self {
        Self {
            id: ACTIVE_ELECTION_ID,
            election_id,
            updated_by: Some(actor.name().to_string()),
            updated_at: Some(at),
        }
    }
}

impl Default for ActiveElection {
    fn default() -> Self {
        Self::unset()
    }
}
