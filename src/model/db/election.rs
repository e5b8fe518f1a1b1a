use std::ops::{Deref, DerefMut};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{ElectionId, ElectionStatus},
    mongodb::optional_datetime,
};

/// Core election data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ElectionCore {
    /// Election name.
    pub name: String,
    /// Where the general assembly is held.
    pub address: String,
    /// Day of the election.
    pub date: NaiveDate,
    /// Scheduled start, overwritten with the actual start when the election starts.
    #[serde(default, with = "optional_datetime")]
    pub start_time: Option<DateTime<Utc>>,
    /// Scheduled end, overwritten with the actual end when the election closes.
    #[serde(default, with = "optional_datetime")]
    pub end_time: Option<DateTime<Utc>>,
    /// Upper bound on the delegate roster, if any.
    pub max_attendees: Option<u32>,
    /// Lifecycle status.
    pub status: ElectionStatus,
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: ElectionId,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}
