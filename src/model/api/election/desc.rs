use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{ElectionId, ElectionStatus},
    db::Election,
};

/// An API-friendly election description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    /// Election unique ID.
    pub id: ElectionId,
    /// Election name.
    pub name: String,
    /// Where the general assembly is held.
    pub address: String,
    /// Day of the election.
    pub date: NaiveDate,
    /// Start time; the actual start once the election has started.
    pub start_time: Option<DateTime<Utc>>,
    /// End time; the actual end once the election has closed.
    pub end_time: Option<DateTime<Utc>>,
    /// Upper bound on the delegate roster.
    pub max_attendees: Option<u32>,
    /// Lifecycle status.
    pub status: ElectionStatus,
}

impl From<Election> for ElectionDescription {
    fn from(election: Election) -> Self {
        Self {
            id: election.id,
            name: election.election.name,
            address: election.election.address,
            date: election.election.date,
            start_time: election.election.start_time,
            end_time: election.election.end_time,
            max_attendees: election.election.max_attendees,
            status: election.election.status,
        }
    }
}

/// The parts of an election printed on a receipt. Excludes anything that
/// changes after voting starts, so receipts stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionHeader {
    pub id: ElectionId,
    pub name: String,
    pub address: String,
    pub date: NaiveDate,
}

impl From<&Election> for ElectionHeader {
    fn from(election: &Election) -> Self {
        Self {
            id: election.id,
            name: election.name.clone(),
            address: election.address.clone(),
            date: election.date,
        }
    }
}
